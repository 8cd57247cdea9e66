//! Named source registry, source-to-bus routing and bus mixing.

mod table;

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, RwLock,
    },
};

use crate::{
    source::{
        AudioSource, AudioSourceConfig, FileSource, GeneratorSource, LiveFeed, LiveInputSource,
        SourceHealth, SourceType,
    },
    sync, AudioBuffer, AudioConfig, AudioDecoder, RenderEngine, SignalRenderer, SourceError,
    WavDecoder,
};

pub use table::RoutingTable;

struct SourceSlot {
    source: Mutex<Box<dyn AudioSource>>,
    health: Mutex<SourceHealth>,
    feed: Mutex<Option<LiveFeed>>,
    removed: AtomicBool,
}

/// Owns every registered source and its health, and mixes routed sources
/// into bus buffers.
///
/// The source map and the routing table each sit behind their own
/// `RwLock`; a pull only holds the map's read lock long enough to clone the
/// slot handle, then locks that one source. Pulls on different sources never
/// contend with each other.
pub struct SourceRouter {
    audio: AudioConfig,
    decoder: Arc<dyn AudioDecoder>,
    renderer: Arc<dyn RenderEngine>,
    sources: RwLock<HashMap<String, Arc<SourceSlot>>>,
    routing: RwLock<RoutingTable>,
}

impl SourceRouter {
    /// Router using the bundled WAV decoder and signal renderer.
    pub fn new(audio: AudioConfig) -> Self {
        Self::with_collaborators(audio, Arc::new(WavDecoder), Arc::new(SignalRenderer))
    }

    pub fn with_collaborators(
        audio: AudioConfig,
        decoder: Arc<dyn AudioDecoder>,
        renderer: Arc<dyn RenderEngine>,
    ) -> Self {
        Self {
            audio,
            decoder,
            renderer,
            sources: RwLock::new(HashMap::new()),
            routing: RwLock::new(RoutingTable::new()),
        }
    }

    /// Bus shape.
    pub fn audio_config(&self) -> &AudioConfig {
        &self.audio
    }

    /// Builds and registers a source from its configuration.
    ///
    /// File sources are decoded here, on the caller's thread.
    pub fn create_source(&self, config: AudioSourceConfig) -> Result<(), SourceError> {
        config.validate()?;
        if self.contains(&config.name) {
            return Err(SourceError::DuplicateName(config.name));
        }

        let mut feed = None;
        let source: Box<dyn AudioSource> = match config.source_type {
            SourceType::File => Box::new(FileSource::open(config, self.decoder.as_ref())?),
            SourceType::Generator => Box::new(GeneratorSource::new(config, self.renderer.clone())),
            SourceType::LiveInput => {
                let (source, live) = LiveInputSource::new(config, self.audio.live_queue_depth);
                feed = Some(live);
                Box::new(source)
            }
        };
        self.insert(source, feed)
    }

    /// Registers an already constructed source.
    pub fn register_source(&self, source: Box<dyn AudioSource>) -> Result<(), SourceError> {
        source.config().validate()?;
        self.insert(source, None)
    }

    fn insert(&self, source: Box<dyn AudioSource>, feed: Option<LiveFeed>) -> Result<(), SourceError> {
        let name = source.name().to_string();
        let source_type = source.source_type();
        let slot = Arc::new(SourceSlot {
            source: Mutex::new(source),
            health: Mutex::new(SourceHealth::new()),
            feed: Mutex::new(feed),
            removed: AtomicBool::new(false),
        });

        let mut sources = sync::write(&self.sources);
        if sources.contains_key(&name) {
            return Err(SourceError::DuplicateName(name));
        }
        sources.insert(name.clone(), slot);
        tracing::info!(source = %name, ?source_type, "source registered");
        Ok(())
    }

    /// Hands out the producer side of a live input. The router keeps no
    /// copy, so dropping every returned feed disconnects the source.
    /// Returns `None` if the feed was already taken or the source is not a
    /// live input.
    pub fn take_live_feed(&self, name: &str) -> Result<Option<LiveFeed>, SourceError> {
        let slot = self.slot(name)?;
        let feed = sync::lock(&slot.feed).take();
        Ok(feed)
    }

    /// Pulls the next block from `name` and updates its health.
    pub fn get_buffer(&self, name: &str) -> Result<AudioBuffer, SourceError> {
        let slot = self.slot(name)?;
        let pulled = {
            let mut source = sync::lock(&slot.source);
            if slot.removed.load(Ordering::Acquire) {
                return Err(SourceError::NotFound(name.to_string()));
            }
            source.next_buffer()
        };

        // Removal while the pull was in flight cancels it.
        if slot.removed.load(Ordering::Acquire) {
            return Err(SourceError::NotFound(name.to_string()));
        }

        let mut buffer = pulled.buffer;
        let repaired = buffer.sanitize();
        if repaired > 0 {
            tracing::warn!(source = %name, repaired, "replaced non-finite samples");
        }
        sync::lock(&slot.health).record(pulled.status);
        Ok(buffer)
    }

    /// Removes a source and every routing entry naming it. Returns whether
    /// the source existed.
    pub fn remove_source(&self, name: &str) -> bool {
        let removed = sync::write(&self.sources).remove(name);
        sync::write(&self.routing).remove(name);

        match removed {
            Some(slot) => {
                slot.removed.store(true, Ordering::Release);
                sync::lock(&slot.feed).take();
                tracing::info!(source = %name, "source removed");
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        sync::read(&self.sources).contains_key(name)
    }

    /// Registered source names, sorted.
    pub fn source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = sync::read(&self.sources).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        sync::read(&self.sources).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn source_health(&self, name: &str) -> Result<SourceHealth, SourceError> {
        let slot = self.slot(name)?;
        let health = sync::lock(&slot.health).clone();
        Ok(health)
    }

    pub fn all_health(&self) -> BTreeMap<String, SourceHealth> {
        let slots: Vec<(String, Arc<SourceSlot>)> = sync::read(&self.sources)
            .iter()
            .map(|(name, slot)| (name.clone(), slot.clone()))
            .collect();
        slots
            .into_iter()
            .map(|(name, slot)| {
                let health = sync::lock(&slot.health).clone();
                (name, health)
            })
            .collect()
    }

    pub fn source_config(&self, name: &str) -> Result<AudioSourceConfig, SourceError> {
        let slot = self.slot(name)?;
        let config = sync::lock(&slot.source).config().clone();
        Ok(config)
    }

    /// Routes `name` to `buses`, replacing earlier routing. Neither the
    /// source nor the buses are validated.
    pub fn set_routing<I, S>(&self, name: &str, buses: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        sync::write(&self.routing).set(name, buses);
    }

    pub fn get_routing(&self, name: &str) -> Vec<String> {
        sync::read(&self.routing).get(name)
    }

    pub fn get_all_routing(&self) -> BTreeMap<String, Vec<String>> {
        sync::read(&self.routing).all()
    }

    /// Mixes every routed bus. Each source is pulled at most once per call
    /// even when it feeds several buses.
    pub fn process_routing(&self) -> BTreeMap<String, AudioBuffer> {
        let buses = sync::read(&self.routing).buses();
        let mut pulled: HashMap<String, Option<AudioBuffer>> = HashMap::new();

        buses
            .into_iter()
            .map(|(bus, sources)| {
                let contributions: Vec<AudioBuffer> = sources
                    .iter()
                    .filter_map(|source| {
                        pulled
                            .entry(source.clone())
                            .or_insert_with(|| self.pull_for_mix(source))
                            .clone()
                    })
                    .collect();
                let mixed = self.mix(&bus, &contributions);
                (bus, mixed)
            })
            .collect()
    }

    /// Mixes a single bus. A bus nothing is routed to is silent.
    pub fn process_bus(&self, bus: &str) -> AudioBuffer {
        let sources = sync::read(&self.routing).sources_for_bus(bus);
        let contributions: Vec<AudioBuffer> = sources
            .iter()
            .filter_map(|source| self.pull_for_mix(source))
            .collect();
        self.mix(bus, &contributions)
    }

    fn pull_for_mix(&self, source: &str) -> Option<AudioBuffer> {
        match self.get_buffer(source) {
            Ok(buffer) => Some(buffer),
            Err(err) => {
                tracing::debug!(source, error = %err, "skipping routed source");
                None
            }
        }
    }

    /// Sums contributions sample-wise into a bus of the configured shape.
    /// Channel counts are remixed (see [`AudioBuffer::remix`]); frame
    /// counts are zero-padded or truncated to `buffer_size`.
    fn mix(&self, bus: &str, contributions: &[AudioBuffer]) -> AudioBuffer {
        let frames = self.audio.buffer_size;
        let channels = self.audio.channels.max(1);
        let mut out = AudioBuffer::silent(frames, channels, self.audio.sample_rate);

        for contribution in contributions {
            if contribution.sample_rate() != self.audio.sample_rate {
                tracing::warn!(
                    bus,
                    source_rate = contribution.sample_rate(),
                    bus_rate = self.audio.sample_rate,
                    "mixing buffer with mismatched sample rate"
                );
            }
            let mut shaped = if contribution.channels() == channels {
                contribution.clone()
            } else {
                tracing::debug!(bus, from = contribution.channels(), to = channels, "remixing channels");
                contribution.remix(channels)
            };
            shaped.fit_frames(frames);
            for (acc, sample) in out.samples_mut().iter_mut().zip(shaped.samples()) {
                *acc += sample;
            }
        }

        debug_assert_eq!(out.samples().len(), frames * channels as usize);
        let repaired = out.sanitize();
        if repaired > 0 {
            tracing::warn!(bus, repaired, "mix produced non-finite samples");
        }
        out
    }

    fn slot(&self, name: &str) -> Result<Arc<SourceSlot>, SourceError> {
        sync::read(&self.sources)
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(name.to_string()))
    }
}

impl std::fmt::Debug for SourceRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRouter")
            .field("audio", &self.audio)
            .field("sources", &self.source_names())
            .finish()
    }
}
