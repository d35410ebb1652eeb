/// Shader modules and SPIR-V reflection
///
/// Reflection only feeds the trace log; pipeline layouts are still declared
/// by the pipelines themselves.

use ash::vk;
use nebula_engine::nebula::pipeline::SPIRV_MAGIC;
use nebula_engine::nebula::{Error, Result};
use nebula_engine::{engine_error, engine_trace, engine_warn};

use crate::vulkan_resources::creation_error;

const SOURCE: &str = "nebula::vulkan::Shader";

/// Check that `code` looks like a SPIR-V module
pub(crate) fn validate_spirv(code: &[u32]) -> Result<()> {
    let reason = match code.first() {
        None => "empty module".to_string(),
        Some(&word) if word != SPIRV_MAGIC => format!("bad magic number 0x{:08x}", word),
        Some(_) if code.len() < 5 => format!("header truncated ({} words)", code.len()),
        Some(_) => return Ok(()),
    };
    engine_error!(SOURCE, "Rejected shader module: {}", reason);
    Err(Error::ShaderModuleLoad { path: "<memory>".to_string(), reason })
}

/// One reflected resource, for logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReflectedResource {
    Descriptor { name: String, set: u32, binding: u32, kind: String },
    PushConstant { name: String, size: Option<usize> },
}

/// Reflect descriptors and push constants of every entry point
pub(crate) fn reflect(code: &[u32]) -> Result<Vec<(String, Vec<ReflectedResource>)>> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(code)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| Error::ShaderModuleLoad {
            path: "<memory>".to_string(),
            reason: format!("SPIR-V reflection failed: {:?}", e),
        })?;

    Ok(entry_points
        .iter()
        .map(|entry_point| {
            let resources = entry_point
                .vars
                .iter()
                .filter_map(|var| match var {
                    spirq::var::Variable::Descriptor { name, desc_bind, desc_ty, .. } => {
                        Some(ReflectedResource::Descriptor {
                            name: name.clone().unwrap_or_default(),
                            set: desc_bind.set(),
                            binding: desc_bind.bind(),
                            kind: format!("{:?}", desc_ty),
                        })
                    }
                    spirq::var::Variable::PushConstant { name, ty } => Some(ReflectedResource::PushConstant {
                        name: name.clone().unwrap_or_default(),
                        size: ty.nbyte(),
                    }),
                    _ => None,
                })
                .collect();
            (entry_point.name.clone(), resources)
        })
        .collect())
}

pub(crate) fn create_shader_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    validate_spirv(code)?;

    match reflect(code) {
        Ok(entry_points) => {
            for (name, resources) in entry_points {
                engine_trace!(SOURCE, "Entry point '{}': {} resources", name, resources.len());
                for resource in resources {
                    engine_trace!(SOURCE, "  {:?}", resource);
                }
            }
        }
        Err(e) => engine_warn!(SOURCE, "Skipping reflection: {}", e),
    }

    let create_info = vk::ShaderModuleCreateInfo::default().code(code);
    unsafe { device.create_shader_module(&create_info, None) }.map_err(|e| creation_error("shader module", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_spirv() {
        assert!(validate_spirv(&[SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]).is_ok());
        assert!(matches!(validate_spirv(&[]), Err(Error::ShaderModuleLoad { .. })));
        assert!(matches!(validate_spirv(&[0xdead_beef, 0, 0, 0, 0]), Err(Error::ShaderModuleLoad { .. })));
        assert!(matches!(validate_spirv(&[SPIRV_MAGIC, 0x0001_0000]), Err(Error::ShaderModuleLoad { .. })));
    }

    #[test]
    fn test_reflect_rejects_garbage() {
        assert!(reflect(&[SPIRV_MAGIC, 0, 0, 0, 0, 0xffff_ffff]).is_err());
    }
}
