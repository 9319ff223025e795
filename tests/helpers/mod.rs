#![allow(dead_code)]

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::{DynamicImage, Rgb, RgbImage};
use smartscan::analysis::{AnalyserSettings, FileAnalyser};
use smartscan::embedding::{l2_normalize, EmbeddingProvider, ImageEmbeddingProvider, TextEmbeddingProvider};
use smartscan::processor::{MemoryProbe, MetricsFailure, MetricsSuccess, ProcessorListener};
use smartscan::{Error, Result};

pub const DIMS: usize = 3;

/// Text provider that reads the vector straight out of the text: `"1,0,0"` embeds to `[1, 0, 0]`.
pub struct VecTextProvider {
    ready: AtomicBool,
    calls: AtomicUsize,
}

impl VecTextProvider {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn uninitialized() -> Self {
        let provider = Self::new();
        provider.ready.store(false, Ordering::SeqCst);
        provider
    }

    /// Number of `embed_batch` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingProvider<str> for VecTextProvider {
    fn init(&self) -> Result<()> {
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn embed_batch(&self, items: &[&str]) -> Result<Vec<Vec<f32>>> {
        if !self.is_initialized() {
            return Err(Error::ModelNotLoaded("mock text".into()));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(items
            .iter()
            .map(|text| {
                let mut v: Vec<f32> = text
                    .split(',')
                    .map(|x| x.trim().parse().unwrap_or(0.0))
                    .collect();
                v.resize(DIMS, 0.0);
                l2_normalize(&v)
            })
            .collect())
    }
}

/// Image provider that embeds the colour of the top-left pixel.
pub struct ColorImageProvider {
    ready: AtomicBool,
    calls: AtomicUsize,
}

impl ColorImageProvider {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingProvider<DynamicImage> for ColorImageProvider {
    fn init(&self) -> Result<()> {
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn embed_batch(&self, items: &[&DynamicImage]) -> Result<Vec<Vec<f32>>> {
        if !self.is_initialized() {
            return Err(Error::ModelNotLoaded("mock image".into()));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(items
            .iter()
            .map(|img| {
                let px = img.to_rgb8().get_pixel(0, 0).0;
                l2_normalize(&px.map(|c| c as f32 / 255.0))
            })
            .collect())
    }
}

pub struct Providers {
    pub text: Arc<VecTextProvider>,
    pub image: Arc<ColorImageProvider>,
}

impl Providers {
    pub fn new() -> Self {
        Self {
            text: Arc::new(VecTextProvider::new()),
            image: Arc::new(ColorImageProvider::new()),
        }
    }

    pub fn analyser(&self, settings: AnalyserSettings) -> Arc<FileAnalyser> {
        let text: Arc<TextEmbeddingProvider> = self.text.clone();
        let image: Arc<ImageEmbeddingProvider> = self.image.clone();
        Arc::new(FileAnalyser::new(text, image, settings))
    }
}

/// Analyser over fresh mock providers with default settings.
pub fn mock_analyser() -> (Providers, Arc<FileAnalyser>) {
    let providers = Providers::new();
    let analyser = providers.analyser(AnalyserSettings::default());
    (providers, analyser)
}

pub struct FixedMemory(pub f64);

impl MemoryProbe for FixedMemory {
    fn available_mb(&self) -> f64 {
        self.0
    }
}

/// Reports each reading in turn, then keeps repeating the last one.
pub struct SequenceMemory(Mutex<Vec<f64>>);

impl SequenceMemory {
    pub fn new(readings: &[f64]) -> Self {
        let mut readings = readings.to_vec();
        readings.reverse();
        Self(Mutex::new(readings))
    }
}

impl MemoryProbe for SequenceMemory {
    fn available_mb(&self) -> f64 {
        let mut readings = self.0.lock().unwrap();
        if readings.len() > 1 {
            readings.pop().unwrap()
        } else {
            readings.last().copied().unwrap_or(0.0)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Active,
    Progress(f64),
    Error(String),
    Batch(usize),
    Complete(usize),
    Fail(usize, String),
}

/// Listener that records every event it sees.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Event>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Events with progress updates filtered out.
    pub fn milestones(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| !matches!(e, Event::Progress(_)))
            .collect()
    }

    pub fn progress(&self) -> Vec<f64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl<I: Debug, O> ProcessorListener<I, O> for RecordingListener {
    fn on_active(&self) {
        self.push(Event::Active);
    }

    fn on_progress(&self, progress: f64) {
        self.push(Event::Progress(progress));
    }

    fn on_error(&self, _error: &Error, item: &I) {
        self.push(Event::Error(format!("{item:?}")));
    }

    fn on_batch_complete(&self, batch: &[O]) {
        self.push(Event::Batch(batch.len()));
    }

    fn on_complete(&self, metrics: &MetricsSuccess) {
        self.push(Event::Complete(metrics.total_processed));
    }

    fn on_fail(&self, metrics: &MetricsFailure) {
        self.push(Event::Fail(metrics.total_processed, metrics.error.to_string()));
    }
}

pub fn write_text(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

pub fn write_image(dir: &Path, name: &str, color: [u8; 3]) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(4, 4, Rgb(color)).save(&path).unwrap();
    path
}

pub fn make_dir(root: &Path, name: &str) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
