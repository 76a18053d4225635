//! Fixture generators for ffmpeg-backed tests.

use std::path::Path;

use ffmpeg_next::format::sample::Type as SampleType;
use ffmpeg_next::format::Sample;

/// Writes a 440 Hz sine as 16-bit PCM WAV.
pub fn write_tone_wav(path: &Path, sample_rate: u32, channels: u16, seconds: f64) {
    ffmpeg_next::init().unwrap();

    let layout = if channels == 1 {
        ffmpeg_next::ChannelLayout::MONO
    } else {
        ffmpeg_next::ChannelLayout::STEREO
    };
    let format = Sample::I16(SampleType::Packed);

    let mut octx = ffmpeg_next::format::output(path).unwrap();
    let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::PCM_S16LE).unwrap();
    let mut ost = octx.add_stream(Some(codec)).unwrap();

    let mut encoder = ffmpeg_next::codec::context::Context::new_with_codec(codec)
        .encoder()
        .audio()
        .unwrap();
    encoder.set_rate(sample_rate as i32);
    encoder.set_channel_layout(layout);
    encoder.set_format(format);
    encoder.set_time_base(ffmpeg_next::Rational(1, sample_rate as i32));
    let mut encoder = encoder.open_as(codec).unwrap();
    ost.set_parameters(&encoder);

    octx.write_header().unwrap();
    let ost_time_base = octx.stream(0).unwrap().time_base();
    let enc_time_base = ffmpeg_next::Rational(1, sample_rate as i32);

    let total = (sample_rate as f64 * seconds).round() as usize;
    let chunk = 1024;
    let mut start = 0;
    while start < total {
        let n = chunk.min(total - start);
        let mut frame = ffmpeg_next::util::frame::audio::Audio::new(format, n, layout);
        frame.set_rate(sample_rate);
        frame.set_pts(Some(start as i64));

        let plane = frame.data_mut(0);
        for i in 0..n {
            let t = (start + i) as f64 / sample_rate as f64;
            let value = ((t * 440.0 * std::f64::consts::TAU).sin() * 0.5 * i16::MAX as f64) as i16;
            for c in 0..channels as usize {
                let offset = (i * channels as usize + c) * 2;
                plane[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
            }
        }

        encoder.send_frame(&frame).unwrap();
        drain(&mut encoder, &mut octx, enc_time_base, ost_time_base);
        start += n;
    }

    encoder.send_eof().unwrap();
    drain(&mut encoder, &mut octx, enc_time_base, ost_time_base);
    octx.write_trailer().unwrap();
}

/// Writes a mono 440 Hz sine as AAC. A `.aac` path gives a raw ADTS
/// stream.
pub fn write_tone_aac(path: &Path, sample_rate: u32, seconds: f64) {
    ffmpeg_next::init().unwrap();

    let layout = ffmpeg_next::ChannelLayout::MONO;
    let format = Sample::F32(SampleType::Planar);

    let mut octx = ffmpeg_next::format::output(path).unwrap();
    let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::AAC).unwrap();
    let mut ost = octx.add_stream(Some(codec)).unwrap();

    let mut encoder = ffmpeg_next::codec::context::Context::new_with_codec(codec)
        .encoder()
        .audio()
        .unwrap();
    encoder.set_rate(sample_rate as i32);
    encoder.set_channel_layout(layout);
    encoder.set_format(format);
    encoder.set_bit_rate(32_000);
    encoder.set_time_base(ffmpeg_next::Rational(1, sample_rate as i32));
    let mut encoder = encoder.open_as(codec).unwrap();
    ost.set_parameters(&encoder);

    octx.write_header().unwrap();
    let ost_time_base = octx.stream(0).unwrap().time_base();
    let enc_time_base = ffmpeg_next::Rational(1, sample_rate as i32);

    let total = (sample_rate as f64 * seconds).round() as usize;
    let chunk = match encoder.frame_size() {
        0 => 1024,
        n => n as usize,
    };
    let mut start = 0;
    while start < total {
        let n = chunk.min(total - start);
        let mut frame = ffmpeg_next::util::frame::audio::Audio::new(format, n, layout);
        frame.set_rate(sample_rate);
        frame.set_pts(Some(start as i64));

        let plane = frame.plane_mut::<f32>(0);
        for (i, sample) in plane.iter_mut().enumerate() {
            let t = (start + i) as f64 / sample_rate as f64;
            *sample = ((t * 440.0 * std::f64::consts::TAU).sin() * 0.5) as f32;
        }

        encoder.send_frame(&frame).unwrap();
        drain(&mut encoder, &mut octx, enc_time_base, ost_time_base);
        start += n;
    }

    encoder.send_eof().unwrap();
    drain(&mut encoder, &mut octx, enc_time_base, ost_time_base);
    octx.write_trailer().unwrap();
}

/// Overwrites the payload of every ADTS frame starting between `from` and
/// `to` (fractions of the file size) with noise. Frame headers stay intact
/// so the demuxer keeps handing the damaged frames to the decoder.
///
/// Returns how many frames were damaged.
pub fn corrupt_adts_payloads(path: &Path, from: f64, to: f64) -> usize {
    let mut bytes = std::fs::read(path).unwrap();
    let start = (bytes.len() as f64 * from) as usize;
    let end = (bytes.len() as f64 * to) as usize;

    let mut noise = 0x2545_f491u32;
    let mut damaged = 0;
    let mut pos = 0;
    while pos + 7 <= bytes.len() {
        assert!(
            bytes[pos] == 0xFF && bytes[pos + 1] & 0xF0 == 0xF0,
            "no ADTS sync word at byte {pos}"
        );
        let header_len = if bytes[pos + 1] & 0x01 == 1 { 7 } else { 9 };
        let frame_len = ((bytes[pos + 3] as usize & 0x03) << 11)
            | ((bytes[pos + 4] as usize) << 3)
            | (bytes[pos + 5] as usize >> 5);
        let frame_len = frame_len.max(header_len);
        let frame_end = (pos + frame_len).min(bytes.len());

        if (start..end).contains(&pos) {
            for byte in &mut bytes[pos + header_len..frame_end] {
                noise = noise.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                *byte = (noise >> 24) as u8;
            }
            damaged += 1;
        }
        pos += frame_len;
    }

    std::fs::write(path, bytes).unwrap();
    damaged
}

fn drain(
    encoder: &mut ffmpeg_next::codec::encoder::audio::Encoder,
    octx: &mut ffmpeg_next::format::context::Output,
    enc_time_base: ffmpeg_next::Rational,
    ost_time_base: ffmpeg_next::Rational,
) {
    let mut packet = ffmpeg_next::Packet::empty();
    while encoder.receive_packet(&mut packet).is_ok() {
        packet.set_stream(0);
        packet.rescale_ts(enc_time_base, ost_time_base);
        packet.write_interleaved(octx).unwrap();
    }
}

/// Writes a short MPEG-4 video with no audio stream.
pub fn write_video_only(path: &Path, num_frames: usize) {
    ffmpeg_next::init().unwrap();

    let (width, height, fps) = (64u32, 48u32, 10i32);
    let mut octx = ffmpeg_next::format::output(path).unwrap();
    let global_header = octx
        .format()
        .flags()
        .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

    let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4).unwrap();
    let mut ost = octx.add_stream(Some(codec)).unwrap();
    let mut encoder = ffmpeg_next::codec::context::Context::new_with_codec(codec)
        .encoder()
        .video()
        .unwrap();
    encoder.set_width(width);
    encoder.set_height(height);
    encoder.set_format(ffmpeg_next::format::Pixel::YUV420P);
    encoder.set_time_base(ffmpeg_next::Rational(1, fps));
    encoder.set_frame_rate(Some(ffmpeg_next::Rational(fps, 1)));
    if global_header {
        encoder.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
    }
    let mut encoder = encoder.open_with(ffmpeg_next::Dictionary::new()).unwrap();
    ost.set_parameters(&encoder);

    octx.write_header().unwrap();
    let ost_time_base = octx.stream(0).unwrap().time_base();

    let mut encoded = ffmpeg_next::Packet::empty();
    for i in 0..num_frames {
        let mut frame = ffmpeg_next::util::frame::video::Video::new(
            ffmpeg_next::format::Pixel::YUV420P,
            width,
            height,
        );
        for plane in 0..3 {
            frame.data_mut(plane).fill(((i * 30) % 256) as u8);
        }
        frame.set_pts(Some(i as i64));
        encoder.send_frame(&frame).unwrap();
        while encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(0);
            encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
            encoded.write_interleaved(&mut octx).unwrap();
        }
    }
    encoder.send_eof().unwrap();
    while encoder.receive_packet(&mut encoded).is_ok() {
        encoded.set_stream(0);
        encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
        encoded.write_interleaved(&mut octx).unwrap();
    }
    octx.write_trailer().unwrap();
}
