//! End-to-end decoding tests against synthetic MDF 4.x files.

mod common;

use common::{CgSpec, CnSpec, V4Builder};
use mdf_decode::{CancelToken, Error, Mdf, MdfOptions, Value, Warning};
use std::sync::Arc;

/// A sorted single-group file with a float master, a linear-converted
/// unsigned channel and a mid-byte bit field.
fn simple_file(cycles: u64) -> Vec<u8> {
    let mut b = V4Builder::new();

    let time_name = b.tx("time");
    let speed_name = b.tx("speed");
    let flags_name = b.tx("flags");
    let speed_unit = b.tx("km/h");
    let speed_cc = b.cc_linear(0.0, 0.25);

    // Record: f64 time @0, u16 speed @8, 4-bit flags in byte 10 bits 2..6.
    let mut records = Vec::new();
    for i in 0..cycles {
        records.extend_from_slice(&(i as f64 * 0.1).to_le_bytes());
        records.extend_from_slice(&(i as u16 * 100).to_le_bytes());
        records.push(((i as u8) & 0x0f) << 2);
    }
    let dt = b.dt(&records);

    let flags_cn = b.cn(CnSpec {
        name: flags_name,
        data_type: 0,
        byte_offset: 10,
        bit_offset: 2,
        bit_count: 4,
        ..Default::default()
    });
    let speed_cn = b.cn(CnSpec {
        next: flags_cn,
        name: speed_name,
        conversion: speed_cc,
        unit: speed_unit,
        data_type: 0,
        byte_offset: 8,
        bit_count: 16,
        ..Default::default()
    });
    let time_cn = b.cn(CnSpec {
        next: speed_cn,
        name: time_name,
        channel_type: 2,
        data_type: 4,
        byte_offset: 0,
        bit_count: 64,
        ..Default::default()
    });

    let cg = b.cg(CgSpec {
        first_cn: time_cn,
        cycle_count: cycles,
        record_len: 11,
        ..Default::default()
    });
    let dg = b.dg(cg, dt, 0);
    b.set_first_dg(dg);
    b.finish()
}

#[test]
fn lists_channel_groups() {
    let mdf = Mdf::from_bytes(simple_file(5)).unwrap();
    assert_eq!(mdf.version(), 410);

    let groups = mdf.channel_groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].record_count, 5);
    assert_eq!(groups[0].record_len, 11);

    let names: Vec<&str> = groups[0].channels.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["time", "speed", "flags"]);
    assert!(groups[0].channels[0].is_master);
    assert_eq!(groups[0].channels[1].unit.as_deref(), Some("km/h"));
}

#[test]
fn decodes_a_sorted_group() {
    let mdf = Mdf::from_bytes(simple_file(5)).unwrap();
    let group = mdf.decode_group(0).unwrap();

    assert_eq!(group.master.name, "time");
    assert_eq!(group.master.samples[3], Some(Value::Float(0.1 * 3.0)));

    let speed = &group.channels["speed"];
    assert_eq!(speed.samples.len(), 5);
    for (i, sample) in speed.samples.iter().enumerate() {
        assert_eq!(*sample, Some(Value::Float(i as f64 * 100.0 * 0.25)));
    }

    let flags = &group.channels["flags"];
    for (i, sample) in flags.samples.iter().enumerate() {
        assert_eq!(*sample, Some(Value::UnsignedInteger(i as u64 & 0x0f)));
    }

    // Every channel shares the one decoded master axis.
    let master = speed.master.as_ref().unwrap();
    assert!(Arc::ptr_eq(master, flags.master.as_ref().unwrap()));
    assert!(group.warnings.is_empty());
}

#[test]
fn decodes_a_single_channel() {
    let mdf = Mdf::from_bytes(simple_file(4)).unwrap();
    let speed = mdf.decode_channel(0, "speed").unwrap();
    assert_eq!(speed.samples.len(), 4);
    assert_eq!(speed.unit.as_deref(), Some("km/h"));
    assert_eq!(speed.master.as_ref().unwrap().name, "time");

    // Asking for the master itself works too.
    let time = mdf.decode_channel(0, "time").unwrap();
    assert!(time.master.is_none());
    assert_eq!(time.samples[1], Some(Value::Float(0.1)));
}

#[test]
fn master_channel_is_shared_and_cached() {
    let mdf = Mdf::from_bytes(simple_file(3)).unwrap();
    let master = mdf.master_channel(0).unwrap();
    assert_eq!(master.name, "time");
    assert_eq!(master.len(), 3);
}

#[test]
fn unknown_channel_and_group_errors() {
    let mdf = Mdf::from_bytes(simple_file(2)).unwrap();
    assert!(matches!(
        mdf.decode_channel(0, "nope"),
        Err(Error::ChannelNotFound { .. })
    ));
    assert!(matches!(
        mdf.decode_group(7),
        Err(Error::GroupOutOfRange {
            index: 7,
            group_count: 1
        })
    ));
}

#[test]
fn invalidation_bits_mark_samples_invalid() {
    let mut b = V4Builder::new();
    let name = b.tx("value");

    // Record: u8 value + 1 invalidation byte; record 2 flagged invalid.
    let mut records = Vec::new();
    for i in 0u8..4 {
        records.push(i);
        records.push(if i == 2 { 0x01 } else { 0x00 });
    }
    let dt = b.dt(&records);

    let cn = b.cn(CnSpec {
        name,
        data_type: 0,
        bit_count: 8,
        flags: 0x02, // invalidation bit valid
        invalidation_bit: 0,
        ..Default::default()
    });
    let cg = b.cg(CgSpec {
        first_cn: cn,
        cycle_count: 4,
        record_len: 1,
        invalidation_bytes: 1,
        ..Default::default()
    });
    let dg = b.dg(cg, dt, 0);
    b.set_first_dg(dg);

    let mdf = Mdf::from_bytes(b.finish()).unwrap();
    let group = mdf.decode_group(0).unwrap();
    let value = &group.channels["value"];
    assert_eq!(value.samples[1], Some(Value::UnsignedInteger(1)));
    assert_eq!(value.samples[2], None);
    assert_eq!(value.valid_samples().count(), 3);
}

#[test]
fn malformed_conversion_degrades_to_identity() {
    let mut b = V4Builder::new();
    let bad_name = b.tx("bad");
    let good_name = b.tx("good");
    let bad_cc = b.cc(99, &[], &[]); // unknown conversion type
    let good_cc = b.cc_linear(1.0, 2.0);

    let mut records = Vec::new();
    for i in 0u8..3 {
        records.push(i);
        records.push(10 + i);
    }
    let dt = b.dt(&records);

    let good_cn = b.cn(CnSpec {
        name: good_name,
        conversion: good_cc,
        data_type: 0,
        byte_offset: 1,
        bit_count: 8,
        ..Default::default()
    });
    let bad_cn = b.cn(CnSpec {
        next: good_cn,
        name: bad_name,
        conversion: bad_cc,
        data_type: 0,
        byte_offset: 0,
        bit_count: 8,
        ..Default::default()
    });
    let cg = b.cg(CgSpec {
        first_cn: bad_cn,
        cycle_count: 3,
        record_len: 2,
        ..Default::default()
    });
    let dg = b.dg(cg, dt, 0);
    b.set_first_dg(dg);

    let mdf = Mdf::from_bytes(b.finish()).unwrap();
    let group = mdf.decode_group(0).unwrap();

    // The bad channel decodes raw and carries the fallback warning.
    let bad = &group.channels["bad"];
    assert_eq!(bad.samples[2], Some(Value::UnsignedInteger(2)));
    assert!(matches!(
        bad.warnings.as_slice(),
        [Warning::ConversionFallback { channel, .. }] if channel == "bad"
    ));

    // Its sibling is unaffected.
    let good = &group.channels["good"];
    assert_eq!(good.samples[0], Some(Value::Float(21.0)));
    assert!(good.warnings.is_empty());
}

#[test]
fn value_to_text_conversion() {
    let mut b = V4Builder::new();
    let name = b.tx("state");
    let off = b.tx("off");
    let on = b.tx("on");
    let cc = b.cc(7, &[off, on, 0], &[0.0, 1.0]);

    let dt = b.dt(&[0u8, 1, 5]);
    let cn = b.cn(CnSpec {
        name,
        conversion: cc,
        data_type: 0,
        bit_count: 8,
        ..Default::default()
    });
    let cg = b.cg(CgSpec {
        first_cn: cn,
        cycle_count: 3,
        record_len: 1,
        ..Default::default()
    });
    let dg = b.dg(cg, dt, 0);
    b.set_first_dg(dg);

    let mdf = Mdf::from_bytes(b.finish()).unwrap();
    let group = mdf.decode_group(0).unwrap();
    let state = &group.channels["state"];
    assert_eq!(state.samples[0], Some(Value::String("off".to_string())));
    assert_eq!(state.samples[1], Some(Value::String("on".to_string())));
    // No match and no default text: the raw value stays.
    assert_eq!(state.samples[2], Some(Value::UnsignedInteger(5)));
}

#[test]
fn missing_master_synthesizes_an_index() {
    let mut b = V4Builder::new();
    let name = b.tx("value");
    let dt = b.dt(&[1u8, 2, 3]);
    let cn = b.cn(CnSpec {
        name,
        data_type: 0,
        bit_count: 8,
        ..Default::default()
    });
    let cg = b.cg(CgSpec {
        first_cn: cn,
        cycle_count: 3,
        record_len: 1,
        ..Default::default()
    });
    let dg = b.dg(cg, dt, 0);
    b.set_first_dg(dg);

    let mdf = Mdf::from_bytes(b.finish()).unwrap();
    let group = mdf.decode_group(0).unwrap();
    assert_eq!(group.master.name, "index");
    assert_eq!(
        group.master.samples,
        vec![
            Some(Value::UnsignedInteger(0)),
            Some(Value::UnsignedInteger(1)),
            Some(Value::UnsignedInteger(2)),
        ]
    );
    assert!(group
        .warnings
        .contains(&Warning::MissingMaster { group: 0 }));
}

#[test]
fn multiple_masters_keep_the_first() {
    let mut b = V4Builder::new();
    let t1_name = b.tx("t1");
    let t2_name = b.tx("t2");
    let dt = b.dt(&[0u8; 32]);

    let t2 = b.cn(CnSpec {
        name: t2_name,
        channel_type: 2,
        data_type: 4,
        byte_offset: 8,
        bit_count: 64,
        ..Default::default()
    });
    let t1 = b.cn(CnSpec {
        next: t2,
        name: t1_name,
        channel_type: 2,
        data_type: 4,
        byte_offset: 0,
        bit_count: 64,
        ..Default::default()
    });
    let cg = b.cg(CgSpec {
        first_cn: t1,
        cycle_count: 2,
        record_len: 16,
        ..Default::default()
    });
    let dg = b.dg(cg, dt, 0);
    b.set_first_dg(dg);

    let mdf = Mdf::from_bytes(b.finish()).unwrap();
    let group = mdf.decode_group(0).unwrap();
    assert_eq!(group.master.name, "t1");
    assert!(group.channels.contains_key("t2"));
    assert!(group.warnings.iter().any(|w| matches!(
        w,
        Warning::MultipleMasters { picked, .. } if picked == "t1"
    )));
}

#[test]
fn vlsd_channel_resolves_offsets_into_signal_data() {
    let mut b = V4Builder::new();
    let name = b.tx("label");

    // Signal data stream: "abc", "", "abcde".
    let mut payload = Vec::new();
    payload.extend_from_slice(&3u32.to_le_bytes());
    payload.extend_from_slice(b"abc");
    payload.extend_from_slice(&0u32.to_le_bytes());
    payload.extend_from_slice(&5u32.to_le_bytes());
    payload.extend_from_slice(b"abcde");
    let sd = b.sd(&payload);

    // Records store u64 byte offsets 0, 7, 11.
    let mut records = Vec::new();
    for offset in [0u64, 7, 11] {
        records.extend_from_slice(&offset.to_le_bytes());
    }
    let dt = b.dt(&records);

    let cn = b.cn(CnSpec {
        name,
        data: sd,
        channel_type: 1, // VLSD
        data_type: 6,    // Latin-1 string
        bit_count: 64,
        ..Default::default()
    });
    let cg = b.cg(CgSpec {
        first_cn: cn,
        cycle_count: 3,
        record_len: 8,
        ..Default::default()
    });
    let dg = b.dg(cg, dt, 0);
    b.set_first_dg(dg);

    let mdf = Mdf::from_bytes(b.finish()).unwrap();
    let group = mdf.decode_group(0).unwrap();
    let label = &group.channels["label"];
    assert_eq!(label.samples[0], Some(Value::String("abc".to_string())));
    assert_eq!(label.samples[1], Some(Value::String(String::new())));
    assert_eq!(label.samples[2], Some(Value::String("abcde".to_string())));
}

#[test]
fn unsorted_groups_demultiplex_by_record_id() {
    let mut b = V4Builder::new();
    let a_name = b.tx("a");
    let b_name = b.tx("b");

    // Interleaved stream A,B,A,A,B with 1-byte record ids.
    // A records: u16 values; B records: u8 values.
    let mut stream = Vec::new();
    stream.push(1);
    stream.extend_from_slice(&10u16.to_le_bytes());
    stream.push(2);
    stream.push(7u8);
    stream.push(1);
    stream.extend_from_slice(&20u16.to_le_bytes());
    stream.push(1);
    stream.extend_from_slice(&30u16.to_le_bytes());
    stream.push(2);
    stream.push(8u8);
    let dt = b.dt(&stream);

    let a_cn = b.cn(CnSpec {
        name: a_name,
        data_type: 0,
        bit_count: 16,
        ..Default::default()
    });
    let b_cn = b.cn(CnSpec {
        name: b_name,
        data_type: 0,
        bit_count: 8,
        ..Default::default()
    });
    let cg_b = b.cg(CgSpec {
        first_cn: b_cn,
        record_id: 2,
        cycle_count: 2,
        record_len: 1,
        ..Default::default()
    });
    let cg_a = b.cg(CgSpec {
        next: cg_b,
        first_cn: a_cn,
        record_id: 1,
        cycle_count: 3,
        record_len: 2,
        ..Default::default()
    });
    let dg = b.dg(cg_a, dt, 1);
    b.set_first_dg(dg);

    let mdf = Mdf::from_bytes(b.finish()).unwrap();
    assert_eq!(mdf.group_count(), 2);

    let a = mdf.decode_group(0).unwrap();
    let a_vals: Vec<_> = a.channels["a"].samples.clone();
    assert_eq!(
        a_vals,
        vec![
            Some(Value::UnsignedInteger(10)),
            Some(Value::UnsignedInteger(20)),
            Some(Value::UnsignedInteger(30)),
        ]
    );

    let bg = mdf.decode_group(1).unwrap();
    let b_vals: Vec<_> = bg.channels["b"].samples.clone();
    assert_eq!(
        b_vals,
        vec![Some(Value::UnsignedInteger(7)), Some(Value::UnsignedInteger(8))]
    );
}

#[test]
fn cyclic_data_group_chain_trips_the_guard() {
    let mut b = V4Builder::new();
    let dg = b.dg(0, 0, 0);
    b.patch_link(dg, 0, dg); // next points at itself
    b.set_first_dg(dg);

    assert!(matches!(
        Mdf::from_bytes(b.finish()),
        Err(Error::CorruptionGuard { .. })
    ));
}

#[test]
fn hop_limit_is_configurable() {
    let file = simple_file(2);
    let open = |limit| {
        Mdf::from_bytes_with(
            file.clone(),
            MdfOptions {
                traversal_hop_limit: limit,
            },
        )
    };

    // Exact boundary: the smallest sufficient budget opens the file, one
    // hop less trips the guard.
    let needed = (1..64).find(|&limit| open(limit).is_ok()).unwrap();
    assert!(needed > 1);
    assert!(matches!(
        open(needed - 1).unwrap_err(),
        Error::CorruptionGuard { .. }
    ));
    assert!(open(needed).is_ok());
}

#[test]
fn decodes_big_endian_bit_fields() {
    let mut b = V4Builder::new();
    let name = b.tx("status");

    // Two 2-byte records, bits 4..12 counted from the low end of the span:
    // 0x1234 >> 4 = 0x23, 0xabcd >> 4 = 0xbc.
    let dt = b.dt(&[0x12, 0x34, 0xab, 0xcd]);

    let cn = b.cn(CnSpec {
        name,
        data_type: 1,
        bit_offset: 4,
        bit_count: 8,
        ..Default::default()
    });
    let cg = b.cg(CgSpec {
        first_cn: cn,
        cycle_count: 2,
        record_len: 2,
        ..Default::default()
    });
    let dg = b.dg(cg, dt, 0);
    b.set_first_dg(dg);

    let mdf = Mdf::from_bytes(b.finish()).unwrap();
    let group = mdf.decode_group(0).unwrap();
    assert_eq!(
        group.channels["status"].samples,
        vec![
            Some(Value::UnsignedInteger(0x23)),
            Some(Value::UnsignedInteger(0xbc)),
        ]
    );
}

#[test]
fn dangling_name_and_unit_links_degrade() {
    let mut b = V4Builder::new();

    let dt = b.dt(&[1u8, 2, 3]);
    let cn = b.cn(CnSpec {
        name: 0xfff0_0000, // far outside the file
        unit: 0xfff0_0008,
        data_type: 0,
        bit_count: 8,
        ..Default::default()
    });
    let cg = b.cg(CgSpec {
        first_cn: cn,
        cycle_count: 3,
        record_len: 1,
        ..Default::default()
    });
    let dg = b.dg(cg, dt, 0);
    b.set_first_dg(dg);

    // Broken metadata links cost the label, never the open.
    let mdf = Mdf::from_bytes(b.finish()).unwrap();
    let group = mdf.decode_group(0).unwrap();

    let channel = &group.channels[&format!("channel_{cn:#x}")];
    assert_eq!(channel.unit, None);
    assert!(channel.warnings.contains(&Warning::UnresolvedOptionalLink {
        address: 0xfff0_0000,
        what: "channel name",
    }));
    assert!(channel.warnings.contains(&Warning::UnresolvedOptionalLink {
        address: 0xfff0_0008,
        what: "unit",
    }));
    assert_eq!(
        channel.samples,
        vec![
            Some(Value::UnsignedInteger(1)),
            Some(Value::UnsignedInteger(2)),
            Some(Value::UnsignedInteger(3)),
        ]
    );
}

#[test]
fn cancellation_aborts_the_decode() {
    let mdf = Mdf::from_bytes(simple_file(10)).unwrap();
    let token = CancelToken::new();
    token.cancel();
    assert!(matches!(
        mdf.decode_group_with(0, &token),
        Err(Error::Cancelled)
    ));
}

#[test]
fn unfinalized_files_open_with_a_warning() {
    let mut b = V4Builder::unfinalized();
    let dg = b.dg(0, 0, 0);
    b.set_first_dg(dg);

    let mdf = Mdf::from_bytes(b.finish()).unwrap();
    assert_eq!(mdf.warnings(), &[Warning::UnfinalizedFile]);
}

#[test]
fn rejects_foreign_bytes() {
    assert!(matches!(
        Mdf::from_bytes(b"PK\x03\x04 not an mdf file at all, padded out...............".to_vec()),
        Err(Error::Format(_))
    ));
}

#[cfg(feature = "compression")]
#[test]
fn decodes_compressed_data_blocks() {
    for zip_type in [0u8, 1] {
        let mut b = V4Builder::new();
        let name = b.tx("value");

        let mut records = Vec::new();
        for i in 0u16..50 {
            records.extend_from_slice(&i.to_le_bytes());
        }
        let dz = b.dz(&records, zip_type, 2);

        let cn = b.cn(CnSpec {
            name,
            data_type: 0,
            bit_count: 16,
            ..Default::default()
        });
        let cg = b.cg(CgSpec {
            first_cn: cn,
            cycle_count: 50,
            record_len: 2,
            ..Default::default()
        });
        let dg = b.dg(cg, dz, 0);
        b.set_first_dg(dg);

        let mdf = Mdf::from_bytes(b.finish()).unwrap();
        let group = mdf.decode_group(0).unwrap();
        let value = &group.channels["value"];
        assert_eq!(value.samples.len(), 50);
        assert_eq!(value.samples[49], Some(Value::UnsignedInteger(49)));
    }
}
