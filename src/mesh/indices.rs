//! Index storage that widens from 16 to 32 bits on demand.

/// Borrowed indices handed to [`Mesh::set_indices`](super::Mesh::set_indices).
#[derive(Debug, Clone, Copy)]
pub enum IndicesView<'a> {
    U16(&'a [u16]),
    U32(&'a [u32]),
}

impl<'a> IndicesView<'a> {
    pub fn len(&self) -> usize {
        match self {
            IndicesView::U16(v) => v.len(),
            IndicesView::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = u32> + 'a> {
        match *self {
            IndicesView::U16(v) => Box::new(v.iter().map(|&i| i as u32)),
            IndicesView::U32(v) => Box::new(v.iter().copied()),
        }
    }
}

impl<'a> From<&'a [u16]> for IndicesView<'a> {
    fn from(v: &'a [u16]) -> Self {
        IndicesView::U16(v)
    }
}

impl<'a> From<&'a [u32]> for IndicesView<'a> {
    fn from(v: &'a [u32]) -> Self {
        IndicesView::U32(v)
    }
}

impl<'a> From<&'a Vec<u16>> for IndicesView<'a> {
    fn from(v: &'a Vec<u16>) -> Self {
        IndicesView::U16(v)
    }
}

impl<'a> From<&'a Vec<u32>> for IndicesView<'a> {
    fn from(v: &'a Vec<u32>) -> Self {
        IndicesView::U32(v)
    }
}

impl<'a, const N: usize> From<&'a [u16; N]> for IndicesView<'a> {
    fn from(v: &'a [u16; N]) -> Self {
        IndicesView::U16(v)
    }
}

impl<'a, const N: usize> From<&'a [u32; N]> for IndicesView<'a> {
    fn from(v: &'a [u32; N]) -> Self {
        IndicesView::U32(v)
    }
}

/// Owned index buffer.
///
/// Stored as 16-bit values unless some index needs more than 16 bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshIndices {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl Default for MeshIndices {
    fn default() -> Self {
        MeshIndices::U16(Vec::new())
    }
}

impl MeshIndices {
    /// Copy `view`, picking the narrowest storage that holds every value.
    pub fn from_view(view: IndicesView<'_>) -> Self {
        let mut out: Vec<u16> = Vec::with_capacity(view.len());
        let mut iter = view.iter();
        while let Some(index) = iter.next() {
            match u16::try_from(index) {
                Ok(narrow) => out.push(narrow),
                Err(_) => {
                    let mut wide: Vec<u32> = Vec::with_capacity(view.len());
                    wide.extend(out.iter().map(|&i| i as u32));
                    wide.push(index);
                    wide.extend(iter);
                    return MeshIndices::U32(wide);
                }
            }
        }
        MeshIndices::U16(out)
    }

    pub fn len(&self) -> usize {
        match self {
            MeshIndices::U16(v) => v.len(),
            MeshIndices::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_u32(&self) -> bool {
        matches!(self, MeshIndices::U32(_))
    }

    pub fn get(&self, i: usize) -> Option<u32> {
        match self {
            MeshIndices::U16(v) => v.get(i).map(|&x| x as u32),
            MeshIndices::U32(v) => v.get(i).copied(),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = u32> + '_> {
        match self {
            MeshIndices::U16(v) => Box::new(v.iter().map(|&i| i as u32)),
            MeshIndices::U32(v) => Box::new(v.iter().copied()),
        }
    }

    /// Widened copy of every index.
    pub fn to_vec(&self) -> Vec<u32> {
        self.iter().collect()
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            MeshIndices::U16(v) => bytemuck::cast_slice(v),
            MeshIndices::U32(v) => bytemuck::cast_slice(v),
        }
    }

    pub fn max_index(&self) -> Option<u32> {
        self.iter().max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_indices_stay_narrow() {
        let indices = MeshIndices::from_view(IndicesView::U32(&[0, 1, 65535]));
        assert!(!indices.is_u32());
        assert_eq!(indices.to_vec(), vec![0, 1, 65535]);
        assert_eq!(indices.as_bytes().len(), 6);
    }

    #[test]
    fn test_first_large_index_promotes() {
        let input = [7u32, 65535, 65536, 3];
        let indices = MeshIndices::from_view(IndicesView::U32(&input));
        assert!(indices.is_u32());
        assert_eq!(indices.to_vec(), input.to_vec());
    }

    #[test]
    fn test_u16_view() {
        let indices = MeshIndices::from_view((&[2u16, 1, 0]).into());
        assert_eq!(indices.get(0), Some(2));
        assert_eq!(indices.get(3), None);
        assert_eq!(indices.max_index(), Some(2));
    }
}
