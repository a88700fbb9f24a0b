//! Loading and saving tensors as safetensors files.
//!
//! Pretrained parameters are looked up by their torch-style dotted names, e.g.
//! `features.0.weight` or `features.1.running_mean`, so that files exported from torchvision
//! state dicts load as they are.

use std::{fs, path::Path};

use log::debug;
use ndarray::IxDyn;
use rayon::prelude::*;
use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::{Result, StyleErr, Tensor, arch::Module, math::dims4};

/// Fills the parameters and buffers of every layer of `module` from a safetensors file.
///
/// # Arguments
/// * `module` - The network to fill.
/// * `path` - The safetensors file.
/// * `prefix` - The dotted path of `module` inside the file, empty if it's the root.
///
/// # Returns
/// The number of tensors loaded, or an error if any of them is missing, isn't `f32` or has a
/// different shape than the layer expects.
pub fn load_parameters<P: AsRef<Path>>(module: &mut Module, path: P, prefix: &str) -> Result<usize> {
    let bytes = fs::read(path.as_ref())?;
    let tensors = SafeTensors::deserialize(&bytes)?;

    let mut loaded = 0;
    for (name, layer) in module.named_layers_mut() {
        let name = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}.{name}")
        };

        for (param_name, param) in layer.params_mut() {
            let value = read_tensor(&tensors, &format!("{name}.{param_name}"))?;
            param.set_value(value.view())?;
            loaded += 1;
        }

        for (buffer_name, buffer) in layer.buffers_mut() {
            let value = read_tensor(&tensors, &format!("{name}.{buffer_name}"))?;
            if value.shape() != buffer.shape() {
                return Err(StyleErr::shape_mismatch(
                    "buffer value",
                    value.shape(),
                    buffer.shape(),
                ));
            }
            buffer.assign(&value);
            loaded += 1;
        }
    }

    debug!(loaded = loaded; "parameters loaded from {}", path.as_ref().display());
    Ok(loaded)
}

/// Reads an NCHW image stored under `name`.
pub fn load_image<P: AsRef<Path>>(path: P, name: &str) -> Result<Tensor> {
    let bytes = fs::read(path)?;
    let tensors = SafeTensors::deserialize(&bytes)?;

    let image = read_tensor(&tensors, name)?;
    dims4(image.shape(), "image")?;
    Ok(image)
}

/// Writes an NCHW image under `name`, replacing the file if it exists.
pub fn save_image<P: AsRef<Path>>(path: P, name: &str, image: &Tensor) -> Result<()> {
    dims4(image.shape(), "image")?;
    save_tensors(path, [(name, image)])
}

/// Writes tensors as `f32` safetensors, replacing the file if it exists.
pub fn save_tensors<'a, P, I>(path: P, tensors: I) -> Result<()>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = (&'a str, &'a Tensor)>,
{
    let buffers: Vec<_> = tensors
        .into_iter()
        .map(|(name, tensor)| {
            let data: Vec<u8> = tensor.iter().flat_map(|v| v.to_le_bytes()).collect();
            (name.to_string(), tensor.shape().to_vec(), data)
        })
        .collect();

    let views = buffers
        .iter()
        .map(|(name, shape, data)| -> Result<_> {
            let view = TensorView::new(Dtype::F32, shape.clone(), data)?;
            Ok((name.as_str(), view))
        })
        .collect::<Result<Vec<_>>>()?;

    let bytes = safetensors::serialize(views, &None)?;
    fs::write(path, bytes)?;
    Ok(())
}

fn read_tensor(tensors: &SafeTensors<'_>, name: &str) -> Result<Tensor> {
    let view = tensors
        .tensor(name)
        .map_err(|_| StyleErr::Weights(format!("missing tensor '{name}'")))?;

    if view.dtype() != Dtype::F32 {
        return Err(StyleErr::Weights(format!(
            "tensor '{name}' is {:?}, expected F32",
            view.dtype()
        )));
    }

    let data = view
        .data()
        .par_chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(Tensor::from_shape_vec(IxDyn(view.shape()), data)?)
}
