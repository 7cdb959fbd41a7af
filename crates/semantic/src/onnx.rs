use once_cell::sync::OnceCell;
use onnxruntime::environment::Environment;
use onnxruntime::ndarray::{Array, Array2};
use onnxruntime::session::Session;
use tokenizers::Tokenizer;

use crate::assets::ModelAssets;
use crate::normalize::{l2_normalize_in_place, masked_mean_pool};
use crate::SemanticError;

static ORT_ENV: OnceCell<Environment> = OnceCell::new();

/// Tokenizer plus ONNX session. Lives on the worker thread that loaded it.
pub(crate) struct LoadedModel {
    tokenizer: Tokenizer,
    session: Session<'static>,
}

impl LoadedModel {
    pub(crate) fn load(assets: &ModelAssets) -> Result<Self, SemanticError> {
        let tokenizer = Tokenizer::from_file(&assets.tokenizer_path)
            .map_err(|e| SemanticError::Inference(e.to_string()))?;

        let session = ort_environment()?
            .new_session_builder()
            .map_err(|e| SemanticError::Inference(e.to_string()))?
            .with_model_from_file(assets.model_path.clone())
            .map_err(|e| SemanticError::Inference(e.to_string()))?;

        Ok(Self { tokenizer, session })
    }

    /// Sentence embeddings for `texts`: masked mean pooling over the token outputs, then L2
    /// normalization. Output order matches input order.
    pub(crate) fn embed<T: AsRef<str>>(
        &mut self,
        texts: &[T],
        max_sequence_length: usize,
    ) -> Result<Vec<Vec<f32>>, SemanticError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let (encoded, max_len) = encode_documents(&self.tokenizer, texts, max_sequence_length)?;
        let (input_ids, attn_mask) = build_padded_arrays(encoded, max_len)?;
        let mut vectors = execute_session(&mut self.session, input_ids, attn_mask)?;
        for vector in vectors.iter_mut() {
            l2_normalize_in_place(vector);
        }
        Ok(vectors)
    }
}

fn ort_environment() -> Result<&'static Environment, SemanticError> {
    ORT_ENV.get_or_try_init(|| {
        Environment::builder()
            .with_name("remediation-embedder")
            .build()
            .map_err(|e| SemanticError::Inference(e.to_string()))
    })
}

struct EncodedDoc {
    ids: Vec<i64>,
    mask: Vec<i64>,
}

fn encode_documents<T>(
    tokenizer: &Tokenizer,
    texts: &[T],
    max_sequence_length: usize,
) -> Result<(Vec<EncodedDoc>, usize), SemanticError>
where
    T: AsRef<str>,
{
    let limit = max_sequence_length.max(1);
    let mut encoded = Vec::with_capacity(texts.len());
    let mut max_len = 0usize;

    for text in texts {
        let encoding = tokenizer
            .encode(text.as_ref(), true)
            .map_err(|e| SemanticError::Inference(e.to_string()))?;
        let mut ids: Vec<i64> = encoding.get_ids().iter().map(|&x| x as i64).collect();
        let mut mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&x| x as i64)
            .collect();
        ids.truncate(limit);
        mask.truncate(limit);
        max_len = max_len.max(ids.len());
        encoded.push(EncodedDoc { ids, mask });
    }

    Ok((encoded, max_len))
}

fn build_padded_arrays(
    encoded: Vec<EncodedDoc>,
    max_len: usize,
) -> Result<(Array2<i64>, Array2<i64>), SemanticError> {
    let seq_len = max_len.max(1);
    let batch = encoded.len();
    let mut id_storage = Vec::with_capacity(batch * seq_len);
    let mut mask_storage = Vec::with_capacity(batch * seq_len);

    for EncodedDoc { ids, mask } in encoded {
        if ids.len() != mask.len() {
            return Err(SemanticError::Inference(
                "tokenizer produced mismatched id/mask lengths".into(),
            ));
        }
        let pad = seq_len.saturating_sub(ids.len());
        id_storage.extend(ids);
        mask_storage.extend(mask);
        id_storage.extend(std::iter::repeat_n(0, pad));
        mask_storage.extend(std::iter::repeat_n(0, pad));
    }

    let input_ids = Array::from_shape_vec((batch, seq_len), id_storage)
        .map_err(|e| SemanticError::Inference(e.to_string()))?;
    let attn_mask = Array::from_shape_vec((batch, seq_len), mask_storage)
        .map_err(|e| SemanticError::Inference(e.to_string()))?;
    Ok((input_ids, attn_mask))
}

fn execute_session(
    session: &mut Session<'static>,
    input_ids: Array2<i64>,
    attn_mask: Array2<i64>,
) -> Result<Vec<Vec<f32>>, SemanticError> {
    let (batch, seq_len) = input_ids.dim();
    let mask_rows: Vec<Vec<i64>> = attn_mask.outer_iter().map(|row| row.to_vec()).collect();

    let mut runtime_inputs = Vec::with_capacity(session.inputs.len());
    let mut input_ids_tensor = Some(input_ids);
    let mut attn_mask_tensor = Some(attn_mask);

    for input in &session.inputs {
        match input.name.as_str() {
            "input_ids" => {
                let tensor = input_ids_tensor.take().ok_or_else(|| {
                    SemanticError::InvalidConfig(
                        "model requested `input_ids` multiple times".into(),
                    )
                })?;
                runtime_inputs.push(tensor.into_dyn());
            }
            "attention_mask" => {
                let tensor = attn_mask_tensor.take().ok_or_else(|| {
                    SemanticError::InvalidConfig(
                        "model requested `attention_mask` multiple times".into(),
                    )
                })?;
                runtime_inputs.push(tensor.into_dyn());
            }
            "token_type_ids" => {
                runtime_inputs.push(Array::from_elem((batch, seq_len), 0_i64).into_dyn());
            }
            other => {
                return Err(SemanticError::Inference(format!(
                    "unsupported model input '{other}'"
                )))
            }
        }
    }

    if runtime_inputs.is_empty() {
        return Err(SemanticError::Inference(
            "model did not declare any inputs".into(),
        ));
    }

    let outputs = session
        .run::<i64, f32, _>(runtime_inputs)
        .map_err(|e| SemanticError::Inference(e.to_string()))?;
    let output_tensor = outputs
        .into_iter()
        .next()
        .ok_or_else(|| SemanticError::Inference("model returned no outputs".into()))?;

    let shape = output_tensor.shape().to_vec();
    let flat: Vec<f32> = output_tensor.iter().copied().collect();
    pool_output(&flat, &shape, &mask_rows)
}

/// Turns the first model output into one vector per input. Token-level outputs
/// (`[batch, seq, hidden]`) are mean pooled; already pooled outputs (`[batch, hidden]`) pass
/// through.
fn pool_output(
    flat: &[f32],
    shape: &[usize],
    mask_rows: &[Vec<i64>],
) -> Result<Vec<Vec<f32>>, SemanticError> {
    match *shape {
        [batch, seq, hidden] if batch == mask_rows.len() => Ok(flat
            .chunks_exact((seq * hidden).max(1))
            .zip(mask_rows)
            .map(|(tokens, mask)| masked_mean_pool(tokens, mask, hidden))
            .collect()),
        [batch, hidden] if batch == mask_rows.len() => {
            Ok(flat.chunks_exact(hidden.max(1)).map(<[f32]>::to_vec).collect())
        }
        _ => Err(SemanticError::Inference(format!(
            "unexpected model output shape {shape:?} for {} inputs",
            mask_rows.len()
        ))),
    }
}
