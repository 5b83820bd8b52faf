//! Synthetic file builders for integration tests.
//!
//! Both builders write real on-disk layouts byte by byte, so the tests
//! exercise the same parsing paths as files produced by acquisition tools.

#![allow(dead_code)]

/// Incremental MDF 4.x file builder.
///
/// `new` emits the identification block and a header block with a zeroed
/// data group link; append blocks in any order and patch links afterwards.
pub struct V4Builder {
    bytes: Vec<u8>,
}

/// File offset of the header block's first-data-group link.
const HD_FIRST_DG_LINK: usize = 64 + 24;

impl V4Builder {
    pub fn new() -> Self {
        let mut bytes = vec![0u8; 64];
        bytes[0..8].copy_from_slice(b"MDF     ");
        bytes[8..16].copy_from_slice(b"4.10    ");
        bytes[16..24].copy_from_slice(b"testgen ");
        bytes[28..30].copy_from_slice(&410u16.to_le_bytes());

        let mut builder = Self { bytes };
        builder.block("##HD", &[0; 6], &[0u8; 104 - 24 - 6 * 8]);
        builder
    }

    pub fn unfinalized() -> Self {
        let mut builder = Self::new();
        builder.bytes[0..8].copy_from_slice(b"UnFinMF ");
        builder
    }

    fn align(&mut self) {
        while self.bytes.len() % 8 != 0 {
            self.bytes.push(0);
        }
    }

    /// Append a block and return its address.
    pub fn block(&mut self, id: &str, links: &[u64], data: &[u8]) -> u64 {
        self.align();
        let addr = self.bytes.len() as u64;
        let length = 24 + links.len() * 8 + data.len();
        self.bytes.extend_from_slice(id.as_bytes());
        self.bytes.extend_from_slice(&0u32.to_le_bytes());
        self.bytes.extend_from_slice(&(length as u64).to_le_bytes());
        self.bytes
            .extend_from_slice(&(links.len() as u64).to_le_bytes());
        for link in links {
            self.bytes.extend_from_slice(&link.to_le_bytes());
        }
        self.bytes.extend_from_slice(data);
        addr
    }

    pub fn patch_u64(&mut self, offset: usize, value: u64) {
        self.bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Patch the `index`-th link of the block at `addr`.
    pub fn patch_link(&mut self, addr: u64, index: usize, value: u64) {
        self.patch_u64(addr as usize + 24 + index * 8, value);
    }

    pub fn set_first_dg(&mut self, addr: u64) {
        self.patch_u64(HD_FIRST_DG_LINK, addr);
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }

    // ------------------------------------------------------------------
    // Block helpers
    // ------------------------------------------------------------------

    pub fn tx(&mut self, text: &str) -> u64 {
        let mut data = text.as_bytes().to_vec();
        data.push(0);
        self.block("##TX", &[], &data)
    }

    /// Data group. Links: next, first_cg, data, comment.
    pub fn dg(&mut self, first_cg: u64, data_addr: u64, record_id_size: u8) -> u64 {
        let mut data = vec![0u8; 8];
        data[0] = record_id_size;
        self.block("##DG", &[0, first_cg, data_addr, 0], &data)
    }

    /// Channel group. Links: next, first_cn, acq_name, acq_source,
    /// first_sr, comment.
    pub fn cg(&mut self, spec: CgSpec) -> u64 {
        let mut data = Vec::with_capacity(104 - 24 - 6 * 8);
        data.extend_from_slice(&spec.record_id.to_le_bytes());
        data.extend_from_slice(&spec.cycle_count.to_le_bytes());
        data.extend_from_slice(&spec.flags.to_le_bytes());
        data.extend_from_slice(&[0u8; 6]); // path separator + reserved
        data.extend_from_slice(&spec.record_len.to_le_bytes());
        data.extend_from_slice(&spec.invalidation_bytes.to_le_bytes());
        self.block(
            "##CG",
            &[spec.next, spec.first_cn, spec.acq_name, 0, 0, 0],
            &data,
        )
    }

    /// Channel. Links: next, component, name, source, conversion, data,
    /// unit, comment.
    pub fn cn(&mut self, spec: CnSpec) -> u64 {
        let mut data = Vec::with_capacity(160 - 24 - 8 * 8);
        data.push(spec.channel_type);
        data.push(0); // sync type
        data.push(spec.data_type);
        data.push(spec.bit_offset);
        data.extend_from_slice(&spec.byte_offset.to_le_bytes());
        data.extend_from_slice(&spec.bit_count.to_le_bytes());
        data.extend_from_slice(&spec.flags.to_le_bytes());
        data.extend_from_slice(&spec.invalidation_bit.to_le_bytes());
        data.resize(160 - 24 - 8 * 8, 0);
        self.block(
            "##CN",
            &[
                spec.next,
                spec.component,
                spec.name,
                0,
                spec.conversion,
                spec.data,
                spec.unit,
                0,
            ],
            &data,
        )
    }

    /// Conversion block without physical range fields.
    pub fn cc(&mut self, cc_type: u8, refs: &[u64], values: &[f64]) -> u64 {
        let mut links = vec![0u64; 4];
        links.extend_from_slice(refs);
        let mut data = Vec::with_capacity(8 + values.len() * 8);
        data.push(cc_type);
        data.push(0); // precision
        data.extend_from_slice(&0u16.to_le_bytes()); // flags
        data.extend_from_slice(&(refs.len() as u16).to_le_bytes());
        data.extend_from_slice(&(values.len() as u16).to_le_bytes());
        for v in values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        self.block("##CC", &links, &data)
    }

    pub fn cc_linear(&mut self, offset: f64, factor: f64) -> u64 {
        self.cc(1, &[], &[offset, factor])
    }

    pub fn dt(&mut self, records: &[u8]) -> u64 {
        self.block("##DT", &[], records)
    }

    pub fn sd(&mut self, payload: &[u8]) -> u64 {
        self.block("##SD", &[], payload)
    }

    /// DZ block standing in for a DT block.
    #[cfg(feature = "compression")]
    pub fn dz(&mut self, original: &[u8], zip_type: u8, zip_parameter: u32) -> u64 {
        use miniz_oxide::deflate::compress_to_vec_zlib;

        let stored: Vec<u8> = match zip_type {
            0 => original.to_vec(),
            1 => {
                let columns = zip_parameter as usize;
                let rows = original.len() / columns;
                let whole = rows * columns;
                let mut transposed = vec![0u8; original.len()];
                for col in 0..columns {
                    for row in 0..rows {
                        transposed[col * rows + row] = original[row * columns + col];
                    }
                }
                transposed[whole..].copy_from_slice(&original[whole..]);
                transposed
            }
            other => panic!("unsupported zip type {other}"),
        };
        let compressed = compress_to_vec_zlib(&stored, 6);

        let mut data = Vec::with_capacity(24 + compressed.len());
        data.extend_from_slice(b"DT");
        data.push(zip_type);
        data.push(0);
        data.extend_from_slice(&zip_parameter.to_le_bytes());
        data.extend_from_slice(&(original.len() as u64).to_le_bytes());
        data.extend_from_slice(&(compressed.len() as u64).to_le_bytes());
        data.extend_from_slice(&compressed);
        self.block("##DZ", &[], &data)
    }
}

#[derive(Default)]
pub struct CgSpec {
    pub next: u64,
    pub first_cn: u64,
    pub acq_name: u64,
    pub record_id: u64,
    pub cycle_count: u64,
    pub flags: u16,
    pub record_len: u32,
    pub invalidation_bytes: u32,
}

#[derive(Default)]
pub struct CnSpec {
    pub next: u64,
    pub component: u64,
    pub name: u64,
    pub conversion: u64,
    pub data: u64,
    pub unit: u64,
    pub channel_type: u8,
    pub data_type: u8,
    pub bit_offset: u8,
    pub byte_offset: u32,
    pub bit_count: u32,
    pub flags: u32,
    pub invalidation_bit: u32,
}

// ============================================================================
// MDF 3.x builder
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Incremental MDF 3.30 file builder.
pub struct V3Builder {
    bytes: Vec<u8>,
    endian: Endian,
}

/// File offset of the 3.x header block's first-data-group link.
const HD3_FIRST_DG_LINK: usize = 64 + 4;

impl V3Builder {
    pub fn new(endian: Endian) -> Self {
        let mut bytes = vec![0u8; 64];
        bytes[0..8].copy_from_slice(b"MDF     ");
        bytes[8..16].copy_from_slice(b"3.30    ");
        bytes[16..24].copy_from_slice(b"testgen ");
        let order_flag: u16 = if endian == Endian::Big { 1 } else { 0 };
        let write16 = |v: u16| match endian {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        };
        bytes[24..26].copy_from_slice(&order_flag.to_le_bytes());
        bytes[28..30].copy_from_slice(&write16(330));

        let mut builder = Self { bytes, endian };
        // 164-byte header block with links zeroed.
        builder.block("HD", &vec![0u8; 160]);
        builder
    }

    pub fn u16b(&self, v: u16) -> [u8; 2] {
        match self.endian {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        }
    }

    pub fn u32b(&self, v: u32) -> [u8; 4] {
        match self.endian {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        }
    }

    pub fn f64b(&self, v: f64) -> [u8; 8] {
        match self.endian {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        }
    }

    /// Append a block (2-char id + u16 size + body) and return its address.
    pub fn block(&mut self, id: &str, body: &[u8]) -> u64 {
        let addr = self.bytes.len() as u64;
        let size = (4 + body.len()) as u16;
        self.bytes.extend_from_slice(id.as_bytes());
        self.bytes.extend_from_slice(&self.u16b(size));
        self.bytes.extend_from_slice(body);
        addr
    }

    /// Append raw bytes (3.x record data has no enclosing block).
    pub fn raw(&mut self, data: &[u8]) -> u64 {
        let addr = self.bytes.len() as u64;
        self.bytes.extend_from_slice(data);
        addr
    }

    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        let raw = self.u32b(value);
        self.bytes[offset..offset + 4].copy_from_slice(&raw);
    }

    pub fn set_first_dg(&mut self, addr: u64) {
        self.patch_u32(HD3_FIRST_DG_LINK, addr as u32);
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }

    pub fn dg(&mut self, first_cg: u32, data_addr: u32, record_id_count: u16) -> u64 {
        let mut body = Vec::new();
        body.extend_from_slice(&self.u32b(0)); // next
        body.extend_from_slice(&self.u32b(first_cg));
        body.extend_from_slice(&self.u32b(0)); // trigger
        body.extend_from_slice(&self.u32b(data_addr));
        body.extend_from_slice(&self.u16b(1)); // group count
        body.extend_from_slice(&self.u16b(record_id_count));
        body.extend_from_slice(&self.u32b(0)); // reserved
        self.block("DG", &body)
    }

    pub fn cg(
        &mut self,
        first_cn: u32,
        record_id: u16,
        channel_count: u16,
        record_size: u16,
        record_count: u32,
    ) -> u64 {
        let mut body = Vec::new();
        body.extend_from_slice(&self.u32b(0)); // next
        body.extend_from_slice(&self.u32b(first_cn));
        body.extend_from_slice(&self.u32b(0)); // comment
        body.extend_from_slice(&self.u16b(record_id));
        body.extend_from_slice(&self.u16b(channel_count));
        body.extend_from_slice(&self.u16b(record_size));
        body.extend_from_slice(&self.u32b(record_count));
        self.block("CG", &body)
    }

    /// 228-byte channel block.
    pub fn cn(
        &mut self,
        next: u32,
        conversion: u32,
        channel_type: u16,
        name: &str,
        start_offset: u16,
        bit_count: u16,
        data_type: u16,
    ) -> u64 {
        let mut body = Vec::new();
        body.extend_from_slice(&self.u32b(next));
        body.extend_from_slice(&self.u32b(conversion));
        body.extend_from_slice(&self.u32b(0)); // source
        body.extend_from_slice(&self.u32b(0)); // dependency
        body.extend_from_slice(&self.u32b(0)); // comment
        body.extend_from_slice(&self.u16b(channel_type));
        let mut short_name = [0u8; 32];
        let n = name.len().min(31);
        short_name[..n].copy_from_slice(&name.as_bytes()[..n]);
        body.extend_from_slice(&short_name);
        body.extend_from_slice(&[0u8; 128]); // description
        body.extend_from_slice(&self.u16b(start_offset));
        body.extend_from_slice(&self.u16b(bit_count));
        body.extend_from_slice(&self.u16b(data_type));
        body.extend_from_slice(&self.u16b(0)); // range valid
        body.extend_from_slice(&[0u8; 24]); // min, max, sampling rate
        body.extend_from_slice(&self.u32b(0)); // long name
        body.extend_from_slice(&self.u32b(0)); // display name
        body.extend_from_slice(&self.u16b(0)); // additional byte offset
        self.block("CN", &body)
    }

    /// Conversion block with plain numeric parameters.
    pub fn cc(&mut self, unit: &str, conversion_type: u16, params: &[f64]) -> u64 {
        let mut body = Vec::new();
        body.extend_from_slice(&self.u16b(0)); // range valid
        body.extend_from_slice(&self.f64b(0.0));
        body.extend_from_slice(&self.f64b(0.0));
        let mut unit_field = [0u8; 20];
        let n = unit.len().min(19);
        unit_field[..n].copy_from_slice(&unit.as_bytes()[..n]);
        body.extend_from_slice(&unit_field);
        body.extend_from_slice(&self.u16b(conversion_type));
        body.extend_from_slice(&self.u16b(params.len() as u16));
        for p in params {
            body.extend_from_slice(&self.f64b(*p));
        }
        self.block("CC", &body)
    }
}
