use super::MaterialValueMap;

/// Per-draw overrides layered over a material's values.
///
/// Unlike [`Material`](super::Material), a block is a plain value: it is copied and compared
/// by content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialPropertyBlock {
    values: MaterialValueMap,
}

impl MaterialPropertyBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> &MaterialValueMap {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    fn value_map(&self) -> &MaterialValueMap {
        &self.values
    }

    fn value_map_mut(&mut self) -> &mut MaterialValueMap {
        &mut self.values
    }
}

impl_value_accessors!(MaterialPropertyBlock);
