use super::DecodeError;
use crate::domain::AccountId;
use ethnum::U256;

/// Big-endian cursor over a bundle payload.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEnd {
                field,
                offset: self.pos,
                needed: n,
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    pub fn u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        Ok(self.array::<1>(field)?[0])
    }

    pub fn bool(&mut self, field: &'static str) -> Result<bool, DecodeError> {
        match self.u8(field)? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(DecodeError::InvalidTag { field, tag }),
        }
    }

    pub fn u16(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(self.array(field)?))
    }

    /// 3-byte unsigned length or count.
    pub fn u24(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        let b = self.array::<3>(field)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    /// 3-byte two's-complement signed value.
    pub fn i24(&mut self, field: &'static str) -> Result<i32, DecodeError> {
        let raw = self.u24(field)?;
        Ok(((raw << 8) as i32) >> 8)
    }

    /// 5-byte unsigned value.
    pub fn u40(&mut self, field: &'static str) -> Result<u64, DecodeError> {
        let b = self.array::<5>(field)?;
        Ok(u64::from_be_bytes([0, 0, 0, b[0], b[1], b[2], b[3], b[4]]))
    }

    pub fn u64(&mut self, field: &'static str) -> Result<u64, DecodeError> {
        Ok(u64::from_be_bytes(self.array(field)?))
    }

    pub fn u128(&mut self, field: &'static str) -> Result<u128, DecodeError> {
        Ok(u128::from_be_bytes(self.array(field)?))
    }

    pub fn u256(&mut self, field: &'static str) -> Result<U256, DecodeError> {
        Ok(U256::from_be_bytes(self.array(field)?))
    }

    pub fn account(&mut self, field: &'static str) -> Result<AccountId, DecodeError> {
        Ok(AccountId(self.array(field)?))
    }

    pub fn optional_account(
        &mut self,
        field: &'static str,
    ) -> Result<Option<AccountId>, DecodeError> {
        if self.bool(field)? {
            Ok(Some(self.account(field)?))
        } else {
            Ok(None)
        }
    }

    /// Length-prefixed byte string.
    pub fn bytes(&mut self, field: &'static str) -> Result<Vec<u8>, DecodeError> {
        let len = self.u24(field)? as usize;
        Ok(self.take(len, field)?.to_vec())
    }

    /// Count-prefixed list; `min_item_len` guards against absurd counts
    /// before any allocation.
    pub fn list<T>(
        &mut self,
        field: &'static str,
        min_item_len: usize,
        mut item: impl FnMut(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<Vec<T>, DecodeError> {
        let count = self.u24(field)? as usize;
        if count.saturating_mul(min_item_len) > self.remaining() {
            return Err(DecodeError::CountTooLarge {
                field,
                count,
                remaining: self.remaining(),
            });
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(item(self)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i24_sign_extension() {
        let mut r = Reader::new(&[0xff, 0xff, 0xc4, 0x00, 0x00, 0x3c]);
        assert_eq!(r.i24("a").unwrap(), -60);
        assert_eq!(r.i24("b").unwrap(), 60);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_u40_reads_five_bytes() {
        let mut r = Reader::new(&[0x01, 0x00, 0x00, 0x00, 0x02]);
        assert_eq!(r.u40("deadline").unwrap(), (1u64 << 32) + 2);
    }

    #[test]
    fn test_unexpected_end_reports_field() {
        let mut r = Reader::new(&[0x00]);
        match r.u16("asset_in") {
            Err(DecodeError::UnexpectedEnd { field, offset, needed }) => {
                assert_eq!(field, "asset_in");
                assert_eq!(offset, 0);
                assert_eq!(needed, 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_bool_tag() {
        let mut r = Reader::new(&[2]);
        assert!(matches!(
            r.bool("flag"),
            Err(DecodeError::InvalidTag { tag: 2, .. })
        ));
    }

    #[test]
    fn test_list_rejects_impossible_count() {
        let mut r = Reader::new(&[0x00, 0x00, 0x05, 0x01]);
        assert!(matches!(
            r.list("prices", 36, |r| r.u8("x")),
            Err(DecodeError::CountTooLarge { count: 5, .. })
        ));
    }
}
