use std::io::Cursor;
use std::sync::mpsc;
use std::time::Duration;

use async_trait::async_trait;
use rodio::decoder::DecoderError;
use rodio::mixer::Mixer;
use rodio::{Decoder, OutputStreamBuilder, Sink, Source};

use super::{AudioBackend, AudioHandle};
use crate::error::{AudioLoadError, LoadErrorKind, PlaybackError};

/// Downloads a stream over HTTP and plays it through the default output device
pub struct RodioBackend {
    http: reqwest::Client,
    mixer: Mixer,
    _output: OutputThread,
}

/// Owns the output stream; the device closes when this is dropped
struct OutputThread {
    _stop: mpsc::Sender<()>,
}

impl RodioBackend {
    pub fn new(http: reqwest::Client) -> Result<Self, PlaybackError> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        // The output stream is not Send on every platform, so it stays on its own thread
        std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || match OutputStreamBuilder::open_default_stream() {
                Ok(mut stream) => {
                    stream.log_on_drop(false);
                    let _ = ready_tx.send(Ok(stream.mixer().clone()));
                    let _ = stop_rx.recv();
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                }
            })
            .map_err(|e| PlaybackError::Output(e.to_string()))?;

        let mixer = ready_rx
            .recv()
            .map_err(|e| PlaybackError::Output(e.to_string()))?
            .map_err(PlaybackError::Output)?;

        tracing::info!("Audio output opened");
        Ok(Self {
            http,
            mixer,
            _output: OutputThread { _stop: stop_tx },
        })
    }
}

#[async_trait]
impl AudioBackend for RodioBackend {
    async fn open(&self, uri: &str) -> Result<Box<dyn AudioHandle>, AudioLoadError> {
        let response = self
            .http
            .get(uri)
            .send()
            .await
            .map_err(|e| AudioLoadError::new(LoadErrorKind::Network, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AudioLoadError::new(
                LoadErrorKind::from_status(status.as_u16()),
                format!("stream request returned {}", status),
            ));
        }

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(media_type);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AudioLoadError::new(LoadErrorKind::Network, e.to_string()))?;
        tracing::debug!(bytes = bytes.len(), mime = ?mime, "Stream downloaded");

        let mixer = self.mixer.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let decoder = decode(bytes.to_vec(), mime.as_deref())?;
            let duration = decoder.total_duration().map(|d| d.as_secs_f64());
            let sink = Sink::connect_new(&mixer);
            sink.pause();
            sink.append(decoder);
            Ok::<_, AudioLoadError>(RodioHandle { sink, duration })
        })
        .await
        .map_err(|e| AudioLoadError::new(LoadErrorKind::Decode, e.to_string()))??;

        Ok(Box::new(handle))
    }
}

/// Bare media type of a `Content-Type` header, without parameters
fn media_type(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next().unwrap_or(content_type).trim();
    if essence.is_empty() || essence.eq_ignore_ascii_case("application/octet-stream") {
        return None;
    }
    Some(essence.to_ascii_lowercase())
}

fn decode(data: Vec<u8>, mime: Option<&str>) -> Result<Decoder<Cursor<Vec<u8>>>, AudioLoadError> {
    let len = data.len() as u64;
    let mut builder = Decoder::builder()
        .with_data(Cursor::new(data))
        .with_byte_len(len)
        .with_seekable(true);

    if let Some(mime) = mime {
        builder = builder.with_mime_type(mime);
    }

    builder.build().map_err(|e| match e {
        DecoderError::UnrecognizedFormat => {
            AudioLoadError::new(LoadErrorKind::UnsupportedFormat, "unrecognized audio format")
        }
        other => AudioLoadError::new(LoadErrorKind::Decode, other.to_string()),
    })
}

struct RodioHandle {
    sink: Sink,
    duration: Option<f64>,
}

impl AudioHandle for RodioHandle {
    fn play(&mut self) -> Result<(), String> {
        self.sink.play();
        Ok(())
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn seek(&mut self, position: f64) -> Result<(), String> {
        self.sink
            .try_seek(Duration::from_secs_f64(position.max(0.0)))
            .map_err(|e| e.to_string())
    }

    fn position(&self) -> f64 {
        self.sink.get_pos().as_secs_f64()
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn is_finished(&self) -> bool {
        self.sink.empty()
    }

    fn set_volume(&mut self, volume: f32) {
        self.sink.set_volume(volume);
    }
}
