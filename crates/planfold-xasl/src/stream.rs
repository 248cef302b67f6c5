//! Byte-stream primitives: big-endian packing and the aligned
//! reservation cursor.
//!
//! Every record start aligns to the greater of 4 and the machine `double`
//! alignment; reservation pads with zeros. Offset 0 addresses the header
//! region, so it doubles as the null pointer encoding.

use planfold_core::value::{DbValue, Oid};

/// Record alignment: `max(4, align_of::<f64>())`.
pub const ALIGN_UNIT: usize = {
    let align = std::mem::align_of::<f64>();
    if align < 4 {
        4
    } else {
        align
    }
};

pub const fn make_align(offset: usize) -> usize {
    (offset + ALIGN_UNIT - 1) & !(ALIGN_UNIT - 1)
}

/// Growable output buffer with an aligned reservation cursor.
#[derive(Debug, Default)]
pub struct Stream {
    buf: Vec<u8>,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Reserves `size` bytes at the next aligned position and returns the
    /// record offset. The gap pads with zeros.
    pub fn reserve_aligned(&mut self, size: usize) -> usize {
        let offset = make_align(self.buf.len());
        self.buf.resize(offset + size, 0);
        offset
    }

    /// Copies a packed record into a previously reserved region.
    pub fn put(&mut self, offset: usize, bytes: &[u8]) {
        self.buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

/// Big-endian packer for one record's payload.
#[derive(Debug, Default)]
pub struct Packer {
    bytes: Vec<u8>,
}

impl Packer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn write_i32(&mut self, v: i32) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_i32(i32::from(v));
    }

    pub fn write_oid(&mut self, oid: &Oid) {
        self.bytes.extend_from_slice(&oid.pageid.to_be_bytes());
        self.bytes.extend_from_slice(&oid.slotid.to_be_bytes());
        self.bytes.extend_from_slice(&oid.volid.to_be_bytes());
    }

    /// String as `(length, bytes, zero padding to 4)`.
    pub fn write_str(&mut self, s: &str) {
        self.write_i32(s.len() as i32);
        self.bytes.extend_from_slice(s.as_bytes());
        while self.bytes.len() % 4 != 0 {
            self.bytes.push(0);
        }
    }

    /// Self-describing DB value: `(type tag, length, payload)`.
    pub fn write_db_value(&mut self, value: &DbValue) {
        match value {
            DbValue::Null => {
                self.write_i32(0);
                self.write_i32(0);
            }
            DbValue::Int(v) => {
                self.write_i32(1);
                self.write_i32(8);
                self.write_i64(*v);
            }
            DbValue::Double(v) => {
                self.write_i32(2);
                self.write_i32(8);
                self.write_f64(*v);
            }
            DbValue::Str(s) => {
                self.write_i32(3);
                let start = self.bytes.len();
                self.write_i32(0); // patched below
                let before = self.bytes.len();
                self.write_str(s);
                let payload = (self.bytes.len() - before) as i32;
                self.bytes[start..start + 4].copy_from_slice(&payload.to_be_bytes());
            }
            DbValue::Date(d) => {
                use chrono_shim::date_to_days;
                self.write_i32(4);
                self.write_i32(4);
                self.write_i32(date_to_days(d));
            }
            DbValue::Time(t) => {
                use chrono_shim::time_to_secs;
                self.write_i32(5);
                self.write_i32(4);
                self.write_i32(time_to_secs(t));
            }
            DbValue::Datetime(dt) => {
                use chrono_shim::datetime_to_millis;
                self.write_i32(6);
                self.write_i32(8);
                self.write_i64(datetime_to_millis(dt));
            }
            DbValue::Oid(oid) => {
                self.write_i32(7);
                self.write_i32(8);
                self.write_oid(oid);
            }
            DbValue::Sequence(items) => {
                self.write_i32(8);
                self.write_i32(items.len() as i32);
                for item in items {
                    self.write_db_value(item);
                }
            }
        }
    }
}

/// Cursor over a byte slice for the reader side.
#[derive(Debug)]
pub struct Unpacker<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Unpacker<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn at(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let slice = self.bytes.get(self.pos..self.pos + n)?;
        self.pos += n;
        Some(slice)
    }

    pub fn read_i32(&mut self) -> Option<i32> {
        self.take(4).map(|b| i32::from_be_bytes(b.try_into().unwrap()))
    }

    pub fn read_i64(&mut self) -> Option<i64> {
        self.take(8).map(|b| i64::from_be_bytes(b.try_into().unwrap()))
    }

    pub fn read_f64(&mut self) -> Option<f64> {
        self.take(8).map(|b| f64::from_be_bytes(b.try_into().unwrap()))
    }

    pub fn read_bool(&mut self) -> Option<bool> {
        self.read_i32().map(|v| v != 0)
    }

    pub fn read_oid(&mut self) -> Option<Oid> {
        let pageid = i32::from_be_bytes(self.take(4)?.try_into().unwrap());
        let slotid = i16::from_be_bytes(self.take(2)?.try_into().unwrap());
        let volid = i16::from_be_bytes(self.take(2)?.try_into().unwrap());
        Some(Oid {
            pageid,
            slotid,
            volid,
        })
    }

    pub fn read_str(&mut self) -> Option<String> {
        let len = self.read_i32()? as usize;
        let s = String::from_utf8(self.take(len)?.to_vec()).ok()?;
        while self.pos % 4 != 0 {
            self.pos += 1;
        }
        Some(s)
    }

    pub fn read_db_value(&mut self) -> Option<DbValue> {
        use chrono_shim::{days_to_date, millis_to_datetime, secs_to_time};
        let tag = self.read_i32()?;
        let len = self.read_i32()?;
        Some(match tag {
            0 => DbValue::Null,
            1 => DbValue::Int(self.read_i64()?),
            2 => DbValue::Double(self.read_f64()?),
            3 => DbValue::Str(self.read_str()?),
            4 => DbValue::Date(days_to_date(self.read_i32()?)?),
            5 => DbValue::Time(secs_to_time(self.read_i32()?)?),
            6 => DbValue::Datetime(millis_to_datetime(self.read_i64()?)?),
            7 => DbValue::Oid(self.read_oid()?),
            8 => {
                let mut items = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    items.push(self.read_db_value()?);
                }
                DbValue::Sequence(items)
            }
            _ => return None,
        })
    }
}

/// Calendar conversions shared by the packer and unpacker.
mod chrono_shim {
    use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

    pub fn date_to_days(d: &NaiveDate) -> i32 {
        d.num_days_from_ce()
    }

    pub fn days_to_date(days: i32) -> Option<NaiveDate> {
        NaiveDate::from_num_days_from_ce_opt(days)
    }

    pub fn time_to_secs(t: &NaiveTime) -> i32 {
        t.num_seconds_from_midnight() as i32
    }

    pub fn secs_to_time(secs: i32) -> Option<NaiveTime> {
        NaiveTime::from_num_seconds_from_midnight_opt(secs as u32, 0)
    }

    pub fn datetime_to_millis(dt: &NaiveDateTime) -> i64 {
        dt.and_utc().timestamp_millis()
    }

    pub fn millis_to_datetime(millis: i64) -> Option<NaiveDateTime> {
        chrono::DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_aligns_to_unit() {
        let mut stream = Stream::new();
        let first = stream.reserve_aligned(5);
        assert_eq!(first, 0);
        let second = stream.reserve_aligned(4);
        assert_eq!(second % ALIGN_UNIT, 0);
        assert!(second >= 5);
    }

    #[test]
    fn integers_are_big_endian() {
        let mut packer = Packer::new();
        packer.write_i32(0x0102_0304);
        assert_eq!(packer.into_bytes(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn strings_pad_to_word() {
        let mut packer = Packer::new();
        packer.write_str("abcde");
        let bytes = packer.into_bytes();
        assert_eq!(bytes.len(), 4 + 8);
        let mut unpacker = Unpacker::new(&bytes);
        assert_eq!(unpacker.read_str().as_deref(), Some("abcde"));
    }

    #[test]
    fn db_values_roundtrip() {
        let values = [
            DbValue::Null,
            DbValue::Int(-42),
            DbValue::Double(2.5),
            DbValue::Str("hello".into()),
            DbValue::Oid(Oid::new(7, 3, 1)),
            DbValue::Sequence(vec![DbValue::Int(1), DbValue::Str("x".into())]),
        ];
        for value in &values {
            let mut packer = Packer::new();
            packer.write_db_value(value);
            let bytes = packer.into_bytes();
            let mut unpacker = Unpacker::new(&bytes);
            assert_eq!(unpacker.read_db_value().as_ref(), Some(value));
        }
    }

    #[test]
    fn oid_packs_to_eight_bytes() {
        let mut packer = Packer::new();
        packer.write_oid(&Oid::new(1, 2, 3));
        assert_eq!(packer.len(), 8);
    }
}
