use proptest::prelude::*;
use risu_proto::{header_len, Endian, HeaderDecodeError, PtrWidth, RisuOp, TraceHeader};

fn all_ops() -> Vec<RisuOp> {
    vec![
        RisuOp::Compare,
        RisuOp::TestEnd,
        RisuOp::SetMemblock,
        RisuOp::GetMemblock,
        RisuOp::CompareMem,
        RisuOp::SetupBegin,
        RisuOp::SetupEnd,
        RisuOp::Sigill,
    ]
}

#[test]
fn every_op_round_trips_in_both_endians_and_widths() {
    for op in all_ops() {
        for &endian in &[Endian::Little, Endian::Big] {
            for &width in &[PtrWidth::Bits32, PtrWidth::Bits64] {
                let h = TraceHeader::new(0x4242, op, 123);
                let mut buf = Vec::new();
                h.encode(endian, width, &mut buf);
                assert_eq!(buf.len(), header_len(width));
                let (decoded, detected) = TraceHeader::decode(&buf, width).unwrap();
                assert_eq!(decoded, h);
                assert_eq!(detected, endian);
            }
        }
    }
}

#[test]
fn unknown_op_value_is_rejected_even_with_good_magic() {
    let mut buf = Vec::new();
    // Hand-roll a header whose op field is out of range but whose magic
    // and size are otherwise well-formed.
    buf.extend_from_slice(&risu_proto::RISU_MAGIC.to_le_bytes());
    buf.extend_from_slice(&0u64.to_le_bytes());
    buf.extend_from_slice(&42i32.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    let err = TraceHeader::decode(&buf, PtrWidth::Bits64).unwrap_err();
    assert_eq!(err, HeaderDecodeError::UnknownOp(42));
}

proptest! {
    #[test]
    fn arbitrary_payloads_never_panic_decoding(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = TraceHeader::decode(&bytes, PtrWidth::Bits64);
        let _ = TraceHeader::decode(&bytes, PtrWidth::Bits32);
    }

    #[test]
    fn round_trip_is_lossless_for_arbitrary_pc_and_size(pc in any::<u64>(), size in any::<u32>()) {
        let h = TraceHeader::new(pc, RisuOp::CompareMem, size);
        let mut buf = Vec::new();
        h.encode(Endian::host(), PtrWidth::Bits64, &mut buf);
        let (decoded, _) = TraceHeader::decode(&buf, PtrWidth::Bits64).unwrap();
        prop_assert_eq!(decoded, h);
    }
}
