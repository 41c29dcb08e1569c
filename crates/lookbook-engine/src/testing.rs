use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use lookbook_contracts::error::{FetchErrorKind, StudioError, UpstreamFailure};

use crate::fetch::{FetchedImage, ImageFetcher};
use crate::providers::{ImageModel, InlineImage, ModelOutput, PromptPayload, ResponsePart};

pub fn png_bytes(width: u32, height: u32, seed: u8) -> Vec<u8> {
    let mut image = RgbaImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        *pixel = Rgba([seed, (x % 256) as u8, (y % 256) as u8, 255]);
    }
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut cursor, ImageFormat::Png)
        .expect("png encode");
    cursor.into_inner()
}

pub fn image_output(seed: u8, note: Option<&str>) -> ModelOutput {
    let mut parts = vec![ResponsePart::Image(InlineImage {
        bytes: png_bytes(8, 8, seed),
        mime_type: "image/png".to_string(),
    })];
    if let Some(note) = note {
        parts.push(ResponsePart::Text(note.to_string()));
    }
    ModelOutput { parts }
}

pub fn failure(status: u16, code: &str, message: &str) -> UpstreamFailure {
    UpstreamFailure::new(Some(status), Some(code), message)
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub text: String,
    pub image_hashes: Vec<String>,
}

/// Replays queued results in call order; an empty queue yields a fresh image.
#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<ModelOutput, UpstreamFailure>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Result<ModelOutput, UpstreamFailure>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn models_called(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.model).collect()
    }
}

impl ImageModel for ScriptedModel {
    fn provider(&self) -> &str {
        "scripted"
    }

    fn generate(
        &self,
        model: &str,
        payload: &PromptPayload,
    ) -> Result<ModelOutput, UpstreamFailure> {
        let mut calls = self.calls.lock().expect("calls lock");
        calls.push(RecordedCall {
            model: model.to_string(),
            text: payload.text.clone(),
            image_hashes: payload
                .images
                .iter()
                .map(|image| image.content_hash.clone())
                .collect(),
        });
        let seed = calls.len() as u8;
        drop(calls);
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Ok(image_output(seed, None)))
    }
}

#[derive(Default)]
pub struct MemoryFetcher {
    images: HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    pub fn with(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.images.insert(url.to_string(), bytes);
        self
    }
}

impl ImageFetcher for MemoryFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedImage, StudioError> {
        self.images
            .get(url)
            .cloned()
            .map(|bytes| FetchedImage {
                bytes,
                content_type: None,
            })
            .ok_or_else(|| StudioError::fetch(FetchErrorKind::NotFound, format!("{url} not found")))
    }
}

/// Serves one canned HTTP response on 127.0.0.1 and hands back the raw request.
pub struct OneShotServer {
    pub base_url: String,
    handle: JoinHandle<std::io::Result<Vec<u8>>>,
}

impl OneShotServer {
    pub fn respond(response: Vec<u8>) -> Self {
        Self::respond_then_stall(response, Duration::ZERO)
    }

    /// Writes `response`, then holds the connection open for `stall`.
    pub fn respond_then_stall(response: Vec<u8>, stall: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
        let base_url = format!("http://{}", listener.local_addr().expect("local addr"));
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept()?;
            let request = read_request(&mut stream)?;
            stream.write_all(&response)?;
            stream.flush()?;
            thread::sleep(stall);
            Ok(request)
        });
        Self { base_url, handle }
    }

    pub fn request(self) -> String {
        let raw = self
            .handle
            .join()
            .expect("test server thread")
            .expect("test server io");
        String::from_utf8_lossy(&raw).into_owned()
    }
}

pub fn http_response(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut raw = format!("HTTP/1.1 {status}\r\n");
    for (name, value) in headers {
        raw.push_str(&format!("{name}: {value}\r\n"));
    }
    raw.push_str("\r\n");
    let mut bytes = raw.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

fn read_request(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut raw = Vec::new();
    let mut chunk = [0_u8; 4096];
    let mut expected = None;
    loop {
        if let Some(total) = expected {
            if raw.len() >= total {
                break;
            }
        }
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..read]);
        if expected.is_none() {
            if let Some(end) = raw.windows(4).position(|window| window == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&raw[..end]).to_ascii_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                expected = Some(end + 4 + length);
            }
        }
    }
    Ok(raw)
}
