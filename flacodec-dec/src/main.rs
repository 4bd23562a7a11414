// Copyright 2022 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Note that clippy attributes should be in sync with those declared in "lib.rs"
#![warn(clippy::all, clippy::nursery, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::multiple_crate_versions,
    clippy::must_use_candidate
)]
// Some from restriction lint-group
#![warn(
    clippy::clone_on_ref_ptr,
    clippy::create_dir,
    clippy::dbg_macro,
    clippy::empty_structs_with_brackets,
    clippy::exit,
    clippy::if_then_some_else_none,
    clippy::impl_trait_in_params,
    clippy::let_underscore_must_use,
    clippy::lossy_float_literal,
    clippy::multiple_inherent_impl,
    clippy::print_stdout,
    clippy::rc_buffer,
    clippy::rc_mutex,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::separated_literal_suffix,
    clippy::str_to_string,
    clippy::string_add,
    clippy::string_to_string,
    clippy::try_err,
    clippy::unnecessary_self_imports,
    clippy::wildcard_enum_match_arm
)]

use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::io::Write;
use std::path::Path;

use clap::Parser;
use log::info;

use flacodec::component::StreamInfo;
use flacodec::config;
use flacodec::error::DecodeError;
use flacodec::Decoder;

use termcolor::ColorChoice;
use termcolor::ColorSpec;
use termcolor::StandardStream;
use termcolor::WriteColor;

/// Version of the decoder binary.
const CRATE_VERSION: &str = match option_env!("CARGO_PKG_VERSION") {
    Some(v) => v,
    None => "unknown",
};

/// Number of inter-channel samples decoded per read.
const CHUNK_SIZE: usize = 4096;

/// FLAC decoder.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path for the output WAV file.
    #[clap(short, long)]
    output: String,
    /// If set, load decoder config from the specified file.
    #[clap(short, long)]
    config: Option<String>,
    /// If set, dump metadata blocks to the specified path in msgpack.
    #[clap(short, long)]
    dump_metadata: Option<String>,
    /// If set, decoding starts from this sample.
    #[clap(long)]
    start: Option<u64>,
    /// Path for the input FLAC file.
    source: String,
}

/// Exit codes of the decoder process.
enum ExitCode {
    InvalidConfig = -1,
    DecoderFailure = -2,
}

/// Shows program banner.
///
/// # Errors
///
/// Propagates unknown I/O errors.
pub fn show_banner() -> Result<(), std::io::Error> {
    let termout = StandardStream::stderr(ColorChoice::Auto);
    let mut termout = termout.lock();
    termout.set_color(ColorSpec::new().set_bold(true))?;
    write!(termout, "\n{:>10} ", "flacodec")?;
    termout.reset()?;
    writeln!(
        termout,
        "(decCLI v{}, engine v{})",
        CRATE_VERSION,
        flacodec::constant::build_info::CRATE_VERSION,
    )?;
    termout.set_color(ColorSpec::new().set_dimmed(true))?;
    writeln!(
        termout,
        "{:>10} [{}]",
        "",
        flacodec::constant::build_info::FEATURES
    )?;
    termout.reset()
}

fn load_config(path: Option<&str>) -> Result<config::Decoder, String> {
    path.map_or_else(
        || Ok(config::Decoder::default()),
        |path| {
            let conf_str =
                std::fs::read_to_string(path).map_err(|e| format!("cannot read {path}: {e}"))?;
            toml::from_str(&conf_str).map_err(|e| format!("syntax error: {e}"))
        },
    )
}

/// Returns the WAV format for the stream.
///
/// WAV containers hold whole bytes, so odd sample sizes are widened.
fn wav_spec(stream_info: &StreamInfo) -> hound::WavSpec {
    hound::WavSpec {
        channels: stream_info.channels() as u16,
        sample_rate: stream_info.sample_rate() as u32,
        bits_per_sample: ((stream_info.bits_per_sample() + 7) / 8 * 8) as u16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn dump_metadata<R: Read + Seek, P: AsRef<Path>>(
    decoder: &Decoder<R>,
    path: P,
) -> Result<(), String> {
    let data = rmp_serde::to_vec_named(decoder.metadata()).map_err(|e| e.to_string())?;
    let mut file = File::create(path).map_err(|e| e.to_string())?;
    file.write_all(&data).map_err(|e| e.to_string())
}

/// Decodes all the remaining samples into a WAV file.
///
/// Returns the number of inter-channel samples written.
fn write_wav<R: Read + Seek, P: AsRef<Path>>(
    decoder: &mut Decoder<R>,
    path: P,
) -> Result<u64, DecodeError> {
    let spec = wav_spec(decoder.stream_info());
    let mut writer = hound::WavWriter::create(path, spec).map_err(io_error_from_hound)?;
    let channels = decoder.stream_info().channels();
    let mut written = 0u64;
    loop {
        let chunk = decoder.read(CHUNK_SIZE)?;
        if chunk.is_empty() {
            break;
        }
        for v in &chunk {
            writer.write_sample(*v).map_err(io_error_from_hound)?;
        }
        written += (chunk.len() / channels) as u64;
    }
    writer.finalize().map_err(io_error_from_hound)?;
    Ok(written)
}

fn io_error_from_hound(e: hound::Error) -> DecodeError {
    match e {
        hound::Error::IoError(e) => e.into(),
        e => std::io::Error::new(std::io::ErrorKind::Other, e).into(),
    }
}

#[allow(clippy::let_underscore_must_use)]
fn main_body(args: Args) -> Result<(), i32> {
    let _ = show_banner();

    let config = load_config(args.config.as_deref()).map_err(|e| {
        eprintln!("Error: {e}");
        ExitCode::InvalidConfig as i32
    })?;

    let report = |e: DecodeError| {
        eprintln!("Error: {e}");
        ExitCode::DecoderFailure as i32
    };
    let file = File::open(&args.source).map_err(|e| report(e.into()))?;
    let mut decoder = Decoder::open(BufReader::new(file), config).map_err(report)?;
    info!(
        "Opened a stream with {} samples in {} metadata blocks.",
        decoder.stream_info().total_samples(),
        decoder.metadata().len()
    );

    if let Some(ref path) = args.dump_metadata {
        dump_metadata(&decoder, path).map_err(|e| {
            eprintln!("Error: failed to dump metadata: {e}");
            ExitCode::DecoderFailure as i32
        })?;
    }

    if let Some(start) = args.start {
        decoder.seek(start).map_err(report)?;
    }
    let written = write_wav(&mut decoder, &args.output).map_err(report)?;
    info!("Wrote {written} samples.");

    Ok(())
}

fn main() -> Result<(), i32> {
    env_logger::Builder::from_env("FLACODEC_LOG")
        .format_timestamp(None)
        .init();
    main_body(Args::parse())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use flacodec::source::MemSource;

    #[test]
    fn odd_sample_sizes_are_widened() {
        let info = StreamInfo::new(44100, 2, 12).expect("valid stream info");
        let spec = wav_spec(&info);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.channels, 2);
    }

    #[test]
    fn decodes_into_wav() {
        let signal: Vec<i32> = (0..6000).map(|t| (t % 300) - 150).collect();
        let src = MemSource::from_samples(&signal, 2, 16, 16000);
        let bytes =
            flacodec::encode_to_vec(&config::Encoder::default(), src).expect("encoder error");

        let dir = tempfile::tempdir().expect("temp dir");
        let wav_path = dir.path().join("out.wav");
        let mut decoder =
            Decoder::open(Cursor::new(bytes), config::Decoder::default()).expect("decoder");
        decoder.seek(1000).expect("seek");
        let written = write_wav(&mut decoder, &wav_path).expect("decode");
        assert_eq!(written, 2000);

        let mut reader = hound::WavReader::open(&wav_path).expect("wav");
        let samples: Vec<i32> = reader
            .samples::<i32>()
            .collect::<Result<_, _>>()
            .expect("samples");
        assert_eq!(samples, &signal[2000..]);
    }
}
