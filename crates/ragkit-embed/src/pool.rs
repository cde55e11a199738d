use anyhow::Result;
use candle_core::{DType, IndexOp, Tensor};

use ragkit_core::model::Pooling;

pub fn pool(hidden: &Tensor, attention_mask: &Tensor, pooling: Pooling) -> Result<Tensor> {
    match pooling {
        Pooling::Cls => cls_l2(hidden),
        Pooling::Mean => masked_mean_l2(hidden, attention_mask),
    }
}

/// First-token ([CLS]) embedding, L2-normalized. `hidden` is `[B,T,H]`.
pub fn cls_l2(hidden: &Tensor) -> Result<Tensor> {
    let dims = hidden.dims();
    assert_eq!(dims.len(), 3, "hidden shape must be [B,T,H]");
    let cls = hidden.i((.., 0))?.contiguous()?;
    l2_normalize(&cls)
}

pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let dims = hidden.dims();
    assert_eq!(dims.len(), 3, "hidden shape must be [B,T,H]");
    let batch = dims[0];
    let hidden_dim = dims[2];

    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let mask_3d = mask.unsqueeze(2)?;
    let mask_broadcast = mask_3d.broadcast_as(hidden.shape()).unwrap_or(mask_3d.repeat((1, 1, hidden_dim))?);
    let masked = (hidden * &mask_broadcast)?;
    let sum = masked.sum(1)?;
    let lengths = mask.sum(1)?.unsqueeze(1)?.to_dtype(sum.dtype())?;
    let mean = l2_normalize(&sum.broadcast_div(&lengths)?)?;
    assert_eq!(mean.dims(), &[batch, hidden_dim]);
    Ok(mean)
}

fn l2_normalize(v: &Tensor) -> Result<Tensor> {
    let eps_val = match v.dtype() { DType::F16 => 1e-6f32, _ => 1e-12f32 };
    let eps = Tensor::new(&[eps_val], v.device())?.to_dtype(v.dtype())?.unsqueeze(0)?;
    let norm = v.sqr()?.sum_keepdim(1)?.sqrt()?.broadcast_add(&eps)?;
    Ok(v.broadcast_div(&norm)?)
}
