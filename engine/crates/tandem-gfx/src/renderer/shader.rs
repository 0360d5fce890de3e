use std::collections::BTreeMap;

use crate::error::{GfxError, GfxResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    TessellationControl,
    TessellationEvaluation,
    Fragment,
    Compute,
}

/// 已经编译好的 shader 二进制，每个 stage 一份
///
/// 核心层只关心字节和 stage，不解析内容
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderInfo {
    stages: BTreeMap<ShaderStage, Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderKind {
    Graphics,
    Compute,
}

impl ShaderInfo {
    pub fn set_shader(&mut self, stage: ShaderStage, binary: impl Into<Vec<u8>>) -> &mut Self {
        self.stages.insert(stage, binary.into());
        self
    }

    #[inline]
    pub fn has_shader(&self, stage: ShaderStage) -> bool {
        self.stages.contains_key(&stage)
    }

    #[inline]
    pub fn get_shader(&self, stage: ShaderStage) -> Option<&[u8]> {
        self.stages.get(&stage).map(Vec::as_slice)
    }

    /// 按照 stage 顺序遍历
    pub fn stages(&self) -> impl Iterator<Item = (ShaderStage, &[u8])> {
        self.stages.iter().map(|(stage, bytes)| (*stage, bytes.as_slice()))
    }

    /// 检查 stage 组合是否合法
    ///
    /// - compute 不能与 vertex/fragment 同时出现
    /// - graphics 必须同时有 vertex 与 fragment
    /// - tessellation control 与 evaluation 必须成对出现
    pub fn validate(&self, name: &str) -> GfxResult<ShaderKind> {
        let fail = |reason: &str| GfxError::construction(format!("GfxShader::{name}"), reason);

        if self.has_shader(ShaderStage::Compute) {
            if self.stages.len() != 1 {
                return Err(fail("a compute shader cannot be combined with other stages"));
            }
            return Ok(ShaderKind::Compute);
        }

        if !self.has_shader(ShaderStage::Vertex) || !self.has_shader(ShaderStage::Fragment) {
            return Err(fail("a graphics shader needs both a vertex and a fragment stage"));
        }
        if self.has_shader(ShaderStage::TessellationControl) != self.has_shader(ShaderStage::TessellationEvaluation) {
            return Err(fail("tessellation control and evaluation stages must be supplied together"));
        }
        Ok(ShaderKind::Graphics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphics_requires_vertex_and_fragment() {
        let mut shader = ShaderInfo::default();
        shader.set_shader(ShaderStage::Vertex, vec![1]);
        assert!(shader.validate("s").is_err());

        shader.set_shader(ShaderStage::Fragment, vec![2]);
        assert_eq!(shader.validate("s").unwrap(), ShaderKind::Graphics);
    }

    #[test]
    fn test_compute_is_exclusive() {
        let mut shader = ShaderInfo::default();
        shader.set_shader(ShaderStage::Compute, vec![1]);
        assert_eq!(shader.validate("s").unwrap(), ShaderKind::Compute);

        shader.set_shader(ShaderStage::Vertex, vec![2]);
        assert!(shader.validate("s").is_err());
    }

    #[test]
    fn test_tessellation_pair() {
        let mut shader = ShaderInfo::default();
        shader
            .set_shader(ShaderStage::Vertex, vec![1])
            .set_shader(ShaderStage::Fragment, vec![2])
            .set_shader(ShaderStage::TessellationControl, vec![3]);
        assert!(shader.validate("s").is_err());

        shader.set_shader(ShaderStage::TessellationEvaluation, vec![4]);
        assert!(shader.validate("s").is_ok());
    }
}
