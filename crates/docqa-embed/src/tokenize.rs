use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::{Encoding, Tokenizer};

/// Input tensors for one padded batch, all `[batch, tokens]` u32.
pub struct BatchInputs {
    pub input_ids: Tensor,
    pub token_type_ids: Tensor,
    pub attention_mask: Tensor,
}

struct Row {
    ids: Vec<u32>,
    type_ids: Vec<u32>,
    mask: Vec<u32>,
}

// Keeps the final special token when cutting down to `max_len`.
fn truncate(enc: &Encoding, max_len: usize) -> Row {
    let mut row = Row {
        ids: enc.get_ids().to_vec(),
        type_ids: enc.get_type_ids().to_vec(),
        mask: enc.get_attention_mask().to_vec(),
    };
    if row.ids.len() > max_len && max_len > 1 {
        for v in [&mut row.ids, &mut row.type_ids, &mut row.mask] {
            let last = v[v.len() - 1];
            v.truncate(max_len - 1);
            v.push(last);
        }
    }
    row
}

fn pad_rows(rows: Vec<Row>, pad_id: u32, device: &Device) -> Result<BatchInputs> {
    let batch = rows.len();
    let width = rows.iter().map(|r| r.ids.len()).max().unwrap_or(0).max(1);
    let (mut ids, mut types, mut mask) = (Vec::with_capacity(batch * width), Vec::with_capacity(batch * width), Vec::with_capacity(batch * width));
    for row in rows {
        let pad = width - row.ids.len();
        ids.extend(row.ids.into_iter().chain(std::iter::repeat(pad_id).take(pad)));
        types.extend(row.type_ids.into_iter().chain(std::iter::repeat(0).take(pad)));
        mask.extend(row.mask.into_iter().chain(std::iter::repeat(0).take(pad)));
    }
    Ok(BatchInputs {
        input_ids: Tensor::from_vec(ids, (batch, width), device)?,
        token_type_ids: Tensor::from_vec(types, (batch, width), device)?,
        attention_mask: Tensor::from_vec(mask, (batch, width), device)?,
    })
}

pub fn pad_id(tokenizer: &Tokenizer) -> u32 {
    tokenizer
        .get_padding()
        .map(|p| p.pad_id)
        .or_else(|| tokenizer.token_to_id("[PAD]"))
        .or_else(|| tokenizer.token_to_id("<pad>"))
        .unwrap_or(0)
}

pub fn tokenize_batch(tokenizer: &Tokenizer, texts: &[String], max_len: usize, device: &Device) -> Result<BatchInputs> {
    let mut rows = Vec::with_capacity(texts.len());
    for text in texts {
        let enc = tokenizer.encode(text.as_str(), true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
        rows.push(truncate(&enc, max_len));
    }
    pad_rows(rows, pad_id(tokenizer), device)
}

/// Encodes `(query, passage)` pairs with segment ids for a cross-encoder.
pub fn tokenize_pairs(tokenizer: &Tokenizer, query: &str, passages: &[&str], max_len: usize, device: &Device) -> Result<BatchInputs> {
    let mut rows = Vec::with_capacity(passages.len());
    for passage in passages {
        let enc = tokenizer.encode((query, *passage), true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
        rows.push(truncate(&enc, max_len));
    }
    pad_rows(rows, pad_id(tokenizer), device)
}
