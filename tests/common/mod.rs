//! 集成测试公共工具: 合成媒体文件构造与会话辅助函数.

#![allow(dead_code)]

use std::io::Write;
use std::sync::Once;

use mediademux::{Demuxer, DemuxerConfig, MediaPacket};
use tempfile::NamedTempFile;

static LOGGER: Once = Once::new();

/// 初始化测试日志, 输出由测试框架捕获
pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::builder().is_test(true).try_init().ok();
    });
}

/// 写入带指定后缀的临时文件
pub fn write_temp(suffix: &str, data: &[u8]) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("mediademux-")
        .suffix(suffix)
        .tempfile()
        .unwrap();
    file.write_all(data).unwrap();
    file.flush().unwrap();
    file
}

pub fn path_of(file: &NamedTempFile) -> &str {
    file.path().to_str().unwrap()
}

/// 创建会话并完成 set_data_source + prepare
pub fn prepared_session(file: &NamedTempFile) -> Demuxer {
    init_logger();
    let demuxer = Demuxer::with_config(DemuxerConfig::default()).unwrap();
    demuxer.set_data_source(path_of(file)).unwrap();
    demuxer.prepare().unwrap();
    demuxer
}

/// 读取轨道直到流末尾
pub fn drain(demuxer: &Demuxer, index: usize) -> Vec<MediaPacket> {
    let mut packets = Vec::new();
    while let Some(packet) = demuxer.read_sample(index).unwrap() {
        packets.push(packet);
    }
    packets
}

// ============================================================
// MP4
// ============================================================

fn make_box(kind: &[u8; 4], content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + content.len());
    out.extend_from_slice(&(8 + content.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(content);
    out
}

fn make_full_box(kind: &[u8; 4], content: &[u8]) -> Vec<u8> {
    let mut body = vec![0u8; 4];
    body.extend_from_slice(content);
    make_box(kind, &body)
}

fn u32s(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// avcC 内容
pub const AVC_CONFIG: [u8; 4] = [0x01, 0x42, 0xC0, 0x1E];

/// AudioSpecificConfig: AAC LC, 44100 Hz, 双声道
pub const AAC_CONFIG: [u8; 2] = [0x12, 0x10];

fn avc1_entry() -> Vec<u8> {
    let mut e = vec![0u8; 6];
    e.extend_from_slice(&1u16.to_be_bytes());
    e.extend_from_slice(&[0u8; 16]);
    e.extend_from_slice(&320u16.to_be_bytes());
    e.extend_from_slice(&240u16.to_be_bytes());
    e.extend_from_slice(&[0u8; 4 + 4 + 4 + 2 + 32 + 2 + 2]);
    e.extend(make_box(b"avcC", &AVC_CONFIG));
    make_box(b"avc1", &e)
}

fn mp4a_entry() -> Vec<u8> {
    let mut e = vec![0u8; 6];
    e.extend_from_slice(&1u16.to_be_bytes());
    e.extend_from_slice(&[0u8; 8]);
    e.extend_from_slice(&2u16.to_be_bytes());
    e.extend_from_slice(&16u16.to_be_bytes());
    e.extend_from_slice(&[0u8; 4]);
    e.extend_from_slice(&(44100u32 << 16).to_be_bytes());
    let mut esds = vec![
        0x03, 0x16, 0x00, 0x01, 0x00, // ES_Descriptor
        0x04, 0x11, 0x40, 0x15, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // DecoderConfig
        0x05, 0x02,
    ];
    esds.extend_from_slice(&AAC_CONFIG);
    e.extend(make_full_box(b"esds", &esds));
    make_box(b"mp4a", &e)
}

fn trak(id: u32, handler: &[u8; 4], entry: Vec<u8>, timescale: u32, stbl: &[u8]) -> Vec<u8> {
    let tkhd = make_full_box(b"tkhd", &u32s(&[0, 0, id, 0, 0]));
    let mdhd = make_full_box(b"mdhd", &u32s(&[0, 0, timescale, 0, 0]));
    let mut hdlr_body = u32s(&[0]);
    hdlr_body.extend_from_slice(handler);
    hdlr_body.extend_from_slice(&[0u8; 13]);
    let hdlr = make_full_box(b"hdlr", &hdlr_body);
    let mut stsd_body = u32s(&[1]);
    stsd_body.extend(entry);
    let mut stbl_body = make_full_box(b"stsd", &stsd_body);
    stbl_body.extend_from_slice(stbl);
    let minf = make_box(b"minf", &make_box(b"stbl", &stbl_body));
    let mdia = make_box(b"mdia", &[mdhd, hdlr, minf].concat());
    make_box(b"trak", &[tkhd, mdia].concat())
}

/// MP4 文件: H.264 视频 `video_frames` 帧 (25fps, 每 5 帧一个关键帧),
/// AAC 音频 `video_frames` 帧 (每帧 1024 采样).
///
/// 每个样本 4 字节, 以全局写入顺序为填充值; 视频与音频样本交替写入 mdat,
/// 每个样本独立成块.
pub fn build_mp4(video_frames: u32) -> Vec<u8> {
    let ftyp = make_box(b"ftyp", b"isom\0\0\0\0isommp41");
    let data_start = (ftyp.len() + 8) as u32;
    let mut payload = Vec::new();
    let mut video_offsets = Vec::new();
    let mut audio_offsets = Vec::new();
    for i in 0..video_frames {
        video_offsets.push(data_start + payload.len() as u32);
        payload.extend_from_slice(&[(2 * i) as u8; 4]);
        audio_offsets.push(data_start + payload.len() as u32);
        payload.extend_from_slice(&[(2 * i + 1) as u8; 4]);
    }
    let mdat = make_box(b"mdat", &payload);

    let chunk_table = |offsets: &[u32]| {
        let mut body = vec![offsets.len() as u32];
        body.extend_from_slice(offsets);
        make_full_box(b"stco", &u32s(&body))
    };
    let keyframes: Vec<u32> = (0..video_frames).filter(|i| i % 5 == 0).map(|i| i + 1).collect();
    let mut stss = vec![keyframes.len() as u32];
    stss.extend(keyframes);

    let video_stbl = [
        make_full_box(b"stts", &u32s(&[1, video_frames, 1000])),
        make_full_box(b"stsc", &u32s(&[1, 1, 1, 1])),
        make_full_box(b"stsz", &u32s(&[4, video_frames])),
        chunk_table(&video_offsets),
        make_full_box(b"stss", &u32s(&stss)),
    ]
    .concat();
    let audio_stbl = [
        make_full_box(b"stts", &u32s(&[1, video_frames, 1024])),
        make_full_box(b"stsc", &u32s(&[1, 1, 1, 1])),
        make_full_box(b"stsz", &u32s(&[4, video_frames])),
        chunk_table(&audio_offsets),
    ]
    .concat();

    let mvhd = make_full_box(b"mvhd", &u32s(&[0, 0, 1000, video_frames * 40, 0]));
    let moov = make_box(
        b"moov",
        &[
            mvhd,
            trak(1, b"vide", avc1_entry(), 25000, &video_stbl),
            trak(2, b"soun", mp4a_entry(), 44100, &audio_stbl),
        ]
        .concat(),
    );
    [ftyp, mdat, moov].concat()
}

// ============================================================
// FLV
// ============================================================

fn flv_tag(tag_type: u8, timestamp: u32, body: &[u8]) -> Vec<u8> {
    let mut out = vec![tag_type];
    out.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(&(timestamp & 0xFF_FFFF).to_be_bytes()[1..]);
    out.push((timestamp >> 24) as u8);
    out.extend_from_slice(&[0, 0, 0]);
    out.extend_from_slice(body);
    out.extend_from_slice(&(11 + body.len() as u32).to_be_bytes());
    out
}

/// FLV 文件: H.264 + AAC, 每 40ms 一对音视频 tag, 每 5 帧一个关键帧
pub fn build_flv(frames: u32) -> Vec<u8> {
    let video = |keyframe: bool, packet_type: u8, payload: &[u8]| {
        let mut body = vec![if keyframe { 0x17 } else { 0x27 }, packet_type, 0, 0, 0];
        body.extend_from_slice(payload);
        body
    };
    let audio = |packet_type: u8, payload: &[u8]| {
        let mut body = vec![0xAF, packet_type];
        body.extend_from_slice(payload);
        body
    };

    let mut data = b"FLV\x01\x05\x00\x00\x00\x09\x00\x00\x00\x00".to_vec();
    data.extend(flv_tag(9, 0, &video(true, 0, &AVC_CONFIG)));
    data.extend(flv_tag(8, 0, &audio(0, &AAC_CONFIG)));
    for i in 0..frames {
        let ts = i * 40;
        data.extend(flv_tag(9, ts, &video(i % 5 == 0, 1, &[i as u8; 8])));
        data.extend(flv_tag(8, ts, &audio(1, &[i as u8; 6])));
    }
    data
}

// ============================================================
// 裸音频流
// ============================================================

/// ADTS 流: AAC LC, 44100 Hz, 双声道, 每帧 16 字节负载
pub fn build_adts(frames: u8) -> Vec<u8> {
    let mut data = Vec::new();
    for i in 0..frames {
        let len = 7 + 16;
        data.extend_from_slice(&[
            0xFF,
            0xF1,
            0x50,
            0x80 | ((len >> 11) as u8 & 0x03),
            (len >> 3) as u8,
            ((len as u8 & 0x07) << 5) | 0x1F,
            0xFC,
        ]);
        data.extend(std::iter::repeat_n(i, 16));
    }
    data
}

/// MP3 流: MPEG-1 Layer III, 128 kbps, 44100 Hz, 每帧 417 字节
pub fn build_mp3(frames: u8) -> Vec<u8> {
    (0..frames)
        .flat_map(|i| {
            let mut frame = vec![i; 417];
            frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
            frame
        })
        .collect()
}

/// AMR-NB 文件: 12.2 kbps 帧, 每帧 20ms
pub fn build_amr(frames: u8) -> Vec<u8> {
    let mut data = b"#!AMR\n".to_vec();
    for i in 0..frames {
        data.push(7 << 3 | 0x04);
        data.extend(std::iter::repeat_n(i, 31));
    }
    data
}
