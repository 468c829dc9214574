//! HEVC 语法编码完整流程测试.
//!
//! 按编码器的实际调用顺序依次写出 VPS, SPS, PPS, APS 与 slice header,
//! 并用 BitReader 回读关键字段.

use tao::codec::hevc::{
    Aps, HevcSyntaxConfig, HevcSyntaxEncoder, NalUnitType, Pps, RecordingTrace,
    ReferencePictureSet, RpsEntry, ScalingList, SliceHeader, SliceType, Sps, TileLayout, Vps,
    VpsLayer, VpsSyntax, WeightParam, encode_aps_rbsp, encode_pps_rbsp, encode_sps_rbsp,
    encode_vps_rbsp,
};
use tao::core::{BitReader, BitWriter, TaoError};

fn gop_sps() -> Sps {
    let mut sps = Sps::default();
    sps.pic_width = 1024;
    sps.pic_height = 768;
    sps.rps_list = vec![
        ReferencePictureSet::explicit(&[RpsEntry::new(-1, true)], &[]),
        ReferencePictureSet::explicit(&[RpsEntry::new(-2, true)], &[RpsEntry::new(2, true)]),
    ];
    sps.finalize_derived_fields();
    sps
}

fn encode_slice(
    config: &HevcSyntaxConfig,
    slice: &mut SliceHeader,
    sps: &Sps,
    pps: &Pps,
) -> Result<(Vec<u8>, RecordingTrace), TaoError> {
    let mut bw = BitWriter::new();
    let mut trace = RecordingTrace::new();
    {
        let mut enc = HevcSyntaxEncoder::with_trace(&mut bw, &mut trace, config);
        enc.encode_slice_header(slice, sps, pps)?;
        enc.encode_entry_points(slice, sps, pps)?;
        enc.write_rbsp_trailing_bits();
    }
    Ok((bw.finish(), trace))
}

#[test]
fn test_parameter_sets_for_single_view_stream() {
    let config = HevcSyntaxConfig::base_profile();
    let sps = gop_sps();
    let pps = Pps::default();

    let vps = encode_vps_rbsp(&Vps::default(), &config).expect("VPS 编码失败");
    let sps_rbsp = encode_sps_rbsp(&sps, &config).expect("SPS 编码失败");
    let pps_rbsp = encode_pps_rbsp(&pps, &sps, &config).expect("PPS 编码失败");
    let aps_rbsp = encode_aps_rbsp(&Aps::default(), None, false, &config).expect("APS 编码失败");

    for (name, rbsp) in [("VPS", &vps), ("SPS", &sps_rbsp), ("PPS", &pps_rbsp), ("APS", &aps_rbsp)] {
        assert!(!rbsp.is_empty(), "{} 不应为空", name);
        assert_ne!(*rbsp.last().unwrap(), 0, "{} 应以 RBSP 尾比特结束", name);
    }

    let mut br = BitReader::new(&pps_rbsp);
    assert_eq!(br.read_ue().unwrap(), 0, "pic_parameter_set_id");
    assert_eq!(br.read_ue().unwrap(), 0, "seq_parameter_set_id");
    assert!(!br.read_flag().unwrap(), "sign_data_hiding_flag");
    assert!(!br.read_flag().unwrap(), "cabac_init_present_flag");
    assert!(br.read_flag().unwrap(), "entropy_coding_mode_flag");
    assert_eq!(br.read_se().unwrap(), 0, "pic_init_qp_minus26");
}

#[test]
fn test_gop_slices() {
    let config = HevcSyntaxConfig::base_profile();
    let sps = gop_sps();
    let pps = Pps {
        use_wp: true,
        ..Default::default()
    };

    // IDR
    let mut idr = SliceHeader {
        slice_type: SliceType::I,
        nal_unit_type: NalUnitType::Idr,
        num_cus_in_frame: 192,
        num_part_in_cu: 256,
        is_next_slice: true,
        slice_qp: 30,
        num_ref_idx: [1, 1, 0],
        max_num_merge_cand: 5,
        ..Default::default()
    };
    let (data, trace) = encode_slice(&config, &mut idr, &sps, &pps).unwrap();
    assert_eq!(idr.num_ref_idx, [0, 0, 0], "IDR slice 的参考数应被清零");
    assert!(trace.contains("idr_pic_id"));
    let mut br = BitReader::new(&data);
    assert!(br.read_flag().unwrap(), "first_slice_in_pic_flag");
    assert_eq!(br.read_ue().unwrap(), 2, "slice_type");

    // 带显式加权预测的 P slice, 引用 SPS 中的 RPS 0
    let mut p = SliceHeader {
        slice_type: SliceType::P,
        poc: 1,
        num_cus_in_frame: 192,
        num_part_in_cu: 256,
        is_next_slice: true,
        slice_qp: 31,
        num_ref_idx: [1, 0, 0],
        rps: sps.rps_list[0].clone(),
        rps_idx: Some(0),
        max_num_merge_cand: 3,
        ..Default::default()
    };
    p.weights[0] = vec![[WeightParam::new(6, 72, -2), WeightParam::identity(6), WeightParam::identity(6)]];
    let (_, trace) = encode_slice(&config, &mut p, &sps, &pps).unwrap();
    assert_eq!(trace.find("short_term_ref_pic_set_idx").next().unwrap().value, 0);
    assert_eq!(trace.find("delta_luma_weight_lX").next().unwrap().value, 8);
    assert_eq!(trace.find("luma_offset_lX").next().unwrap().value, -2);
    // gop_sps 无并行划分, 不写入口点, merge 候选数之后只剩 RBSP 尾比特
    let names = trace.names();
    let stop = names
        .iter()
        .position(|&n| n == "rbsp_stop_one_bit")
        .expect("应写出 RBSP 停止位");
    assert!(stop > 0);
    assert_eq!(names[stop - 1], "maxNumMergeCand", "merge 候选数应是 slice header 最后一个字段");
    assert!(!trace.contains("num_entry_point_offsets"));

    // 第二个 slice, 地址 96
    let mut second = p.clone();
    second.slice_cur_start_cu_addr = 96 * 256;
    let (_, trace) = encode_slice(&config, &mut second, &sps, &pps).unwrap();
    let addr = trace.find("slice_address").next().unwrap();
    assert_eq!((addr.value, addr.bits), (96, 8));
}

#[test]
fn test_tile_stream_entry_points() {
    let config = HevcSyntaxConfig::base_profile();
    let mut sps = Sps::default();
    sps.tiles = TileLayout {
        num_columns_minus1: 1,
        uniform_spacing: true,
        ..Default::default()
    };
    sps.finalize_derived_fields();
    let pps = Pps::default();
    let pps_rbsp = encode_pps_rbsp(&pps, &sps, &config).unwrap();
    assert!(!pps_rbsp.is_empty());

    let mut slice = SliceHeader {
        slice_type: SliceType::I,
        nal_unit_type: NalUnitType::Idr,
        num_cus_in_frame: 28,
        num_part_in_cu: 256,
        is_next_slice: true,
        slice_qp: 30,
        max_num_merge_cand: 5,
        tile_locations: vec![120, 260],
        ..Default::default()
    };
    let (_, trace) = encode_slice(&config, &mut slice, &sps, &pps).unwrap();
    let offsets: Vec<i64> = trace.find("entry_point_offset").map(|e| e.value).collect();
    assert_eq!(offsets.len(), 2);
    assert!(offsets[0] > 120, "首个偏移包含 slice header 字节");
    assert_eq!(offsets[1], 140);
}

#[test]
fn test_multiview_depth_layer() {
    let config = HevcSyntaxConfig::default();
    let mut vps = Vps::default();
    vps.max_layers = 2;
    vps.layers = vec![
        VpsLayer::default(),
        VpsLayer {
            dependent: true,
            view_id: 0,
            depth_flag: true,
            direct_ref_layer_ids: vec![0],
            ..Default::default()
        },
    ];
    vps.finalize_derived_fields();
    assert!(encode_vps_rbsp(&vps, &config).is_ok());
    let op_config = HevcSyntaxConfig {
        vps_syntax: VpsSyntax::MultiViewOperationPoints,
        ..Default::default()
    };
    assert!(encode_vps_rbsp(&vps, &op_config).is_ok());

    let mut depth_sps = gop_sps();
    depth_sps.multiview.is_depth = true;
    depth_sps.multiview.use_mvi = true;
    let rbsp = encode_sps_rbsp(&depth_sps, &config).unwrap();
    let texture = encode_sps_rbsp(&gop_sps(), &config).unwrap();
    assert_ne!(rbsp, texture, "深度 SPS 带有额外的扩展字段");

    // MVI 提供一个额外 merge 候选
    let mut slice = SliceHeader {
        slice_type: SliceType::P,
        poc: 1,
        is_depth: true,
        num_cus_in_frame: 192,
        num_part_in_cu: 256,
        is_next_slice: true,
        slice_qp: 34,
        num_ref_idx: [1, 0, 0],
        rps: depth_sps.rps_list[0].clone(),
        rps_idx: Some(0),
        max_num_merge_cand: 6,
        ..Default::default()
    };
    let (_, trace) = encode_slice(&config, &mut slice, &depth_sps, &Pps::default()).unwrap();
    assert_eq!(trace.find("maxNumMergeCand").next().unwrap().value, 0);
}

#[test]
fn test_aps_with_scaling_list() {
    let config = HevcSyntaxConfig::default();
    let aps = Aps {
        aps_id: 1,
        scaling_list_enabled: true,
        loop_filter_offset_in_aps: true,
    };
    let flat = encode_aps_rbsp(&aps, Some(&ScalingList::flat()), false, &config).unwrap();
    let mut custom = ScalingList::flat();
    custom.matrices[1][3].coefs[10] = 40;
    let custom_rbsp = encode_aps_rbsp(&aps, Some(&custom), false, &config).unwrap();
    assert!(custom_rbsp.len() > flat.len(), "非平坦矩阵需要 DPCM 编码");
}

#[test]
fn test_errors_leave_caller_to_discard_output() {
    let config = HevcSyntaxConfig::base_profile();
    let sps = gop_sps();
    let mut slice = SliceHeader {
        slice_type: SliceType::P,
        poc: 1,
        num_cus_in_frame: 192,
        num_part_in_cu: 256,
        is_next_slice: true,
        num_ref_idx: [0, 0, 0],
        max_num_merge_cand: 5,
        ..Default::default()
    };
    let err = encode_slice(&config, &mut slice, &sps, &Pps::default()).unwrap_err();
    assert!(matches!(err, TaoError::InvalidArgument(_)), "P slice 至少需要一个参考");
}
