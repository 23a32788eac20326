/// Dense array of 4-bit values, two per byte (low nibble = even index)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NibbleArray {
    len: usize,
    data: Vec<u8>,
}

impl NibbleArray {
    pub fn new(len: usize) -> Self {
        Self::filled(len, 0)
    }

    pub fn filled(len: usize, value: u8) -> Self {
        let v = value & 0x0F;
        Self {
            len,
            data: vec![v | (v << 4); (len + 1) / 2],
        }
    }

    /// Wrap packed bytes; `None` if the byte count does not match `len`
    pub fn from_bytes(len: usize, data: Vec<u8>) -> Option<Self> {
        if data.len() != (len + 1) / 2 {
            return None;
        }
        Some(Self { len, data })
    }

    #[inline]
    pub fn get(&self, index: usize) -> u8 {
        let byte = self.data[index >> 1];
        if index & 1 == 0 {
            byte & 0x0F
        } else {
            byte >> 4
        }
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: u8) {
        let byte = &mut self.data[index >> 1];
        let v = value & 0x0F;
        if index & 1 == 0 {
            *byte = (*byte & 0xF0) | v;
        } else {
            *byte = (*byte & 0x0F) | (v << 4);
        }
    }

    pub fn fill(&mut self, value: u8) {
        let v = value & 0x0F;
        self.data.fill(v | (v << 4));
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nibbles_are_independent() {
        let mut arr = NibbleArray::new(4);
        arr.set(0, 7);
        arr.set(1, 15);
        arr.set(2, 3);
        assert_eq!(arr.get(0), 7);
        assert_eq!(arr.get(1), 15);
        assert_eq!(arr.get(2), 3);
        assert_eq!(arr.get(3), 0);
        arr.set(1, 20);
        assert_eq!(arr.get(1), 4);
        assert_eq!(arr.get(0), 7);
    }

    #[test]
    fn test_from_bytes_checks_length() {
        assert!(NibbleArray::from_bytes(8, vec![0; 4]).is_some());
        assert!(NibbleArray::from_bytes(8, vec![0; 3]).is_none());
    }
}
