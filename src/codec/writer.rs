use super::EncodeError;
use crate::domain::AccountId;
use ethnum::U256;

const U24_MAX: usize = 0x00ff_ffff;

/// Big-endian writer producing the bundle wire format.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn bool(&mut self, v: bool) {
        self.u8(u8::from(v));
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn u24(&mut self, v: usize, field: &'static str) -> Result<(), EncodeError> {
        if v > U24_MAX {
            return Err(EncodeError::TooLong { field, len: v });
        }
        self.buf.extend_from_slice(&(v as u32).to_be_bytes()[1..]);
        Ok(())
    }

    pub fn i24(&mut self, v: i32, field: &'static str) -> Result<(), EncodeError> {
        if !(-(1 << 23)..(1 << 23)).contains(&v) {
            return Err(EncodeError::OutOfRange { field });
        }
        self.buf.extend_from_slice(&v.to_be_bytes()[1..]);
        Ok(())
    }

    pub fn u40(&mut self, v: u64, field: &'static str) -> Result<(), EncodeError> {
        if v >= 1 << 40 {
            return Err(EncodeError::OutOfRange { field });
        }
        self.buf.extend_from_slice(&v.to_be_bytes()[3..]);
        Ok(())
    }

    pub fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn u128(&mut self, v: u128) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn u256(&mut self, v: U256) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn account(&mut self, id: &AccountId) {
        self.buf.extend_from_slice(id.as_bytes());
    }

    pub fn optional_account(&mut self, id: Option<&AccountId>) {
        match id {
            Some(id) => {
                self.bool(true);
                self.account(id);
            }
            None => self.bool(false),
        }
    }

    pub fn bytes(&mut self, data: &[u8], field: &'static str) -> Result<(), EncodeError> {
        self.u24(data.len(), field)?;
        self.buf.extend_from_slice(data);
        Ok(())
    }

    pub fn list<T>(
        &mut self,
        items: &[T],
        field: &'static str,
        mut item: impl FnMut(&mut Self, &T) -> Result<(), EncodeError>,
    ) -> Result<(), EncodeError> {
        self.u24(items.len(), field)?;
        for it in items {
            item(self, it)?;
        }
        Ok(())
    }
}
