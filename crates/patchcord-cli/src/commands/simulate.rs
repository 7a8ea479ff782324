//! Audio-thread / UI-thread dispatch simulation.
//!
//! An audio thread renders blocks and issues asynchronous attribute, bypass,
//! preset and automation changes. The calling thread plays the UI: it
//! flushes the queues on the configured timer, swaps processors in and out
//! of the rack, and resumes `--pause`d paths once half the blocks are done.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use clap::Args;
use patchcord_config::DispatchConfig;
use patchcord_core::{
    AttributeListener, BypassListener, CustomAutomationManager, CustomAutomationSource,
    DispatchStats, DispatchThread, DispatchType, FlushStats, HashedPath, OtherChangeListener,
    Processor, ProcessorChangeEvent, RootObject, SuspensionState, ValueListener,
};
use serde::Serialize;

use super::config::load_config;

#[derive(Args)]
pub struct SimulateArgs {
    /// Config name or path (default: built-in defaults)
    #[arg(short, long)]
    config: Option<String>,

    /// Number of processors in the rack
    #[arg(short, long, default_value = "4")]
    processors: usize,

    /// Attribute slots per processor
    #[arg(short, long, default_value = "16")]
    attributes: usize,

    /// Audio blocks to render
    #[arg(short, long, default_value = "2000")]
    blocks: usize,

    /// Attribute changes per processor per block
    #[arg(long, default_value = "8")]
    changes_per_block: usize,

    /// Samples per block
    #[arg(long, default_value = "64")]
    block_size: usize,

    /// Sample rate in Hz
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Sleep between blocks to hold the real-time block cadence
    #[arg(long)]
    realtime: bool,

    /// Replace the oldest processor every N full flushes (0 disables)
    #[arg(long, default_value = "10")]
    churn_every: usize,

    /// Pause a path until half the blocks are rendered (repeatable)
    #[arg(long = "pause", value_name = "PATTERN")]
    pauses: Vec<String>,

    /// Seed for the change pattern
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Emit JSON instead of text
    #[arg(long)]
    json: bool,
}

/// Toggle bypass on every processor this often, in blocks.
const BYPASS_EVERY: usize = 32;

/// Send a preset change this often, in blocks.
const PRESET_EVERY: usize = 128;

pub fn run(args: SimulateArgs) -> anyhow::Result<()> {
    if args.processors == 0 || args.attributes == 0 || args.block_size == 0 {
        anyhow::bail!("--processors, --attributes and --block-size must be greater than zero");
    }
    if args.sample_rate == 0 {
        anyhow::bail!("--sample-rate must be greater than zero");
    }

    let config = match &args.config {
        Some(name) => load_config(name)?.1,
        None => DispatchConfig::new(),
    };
    let root = config.build_root()?;

    let pauses = args
        .pauses
        .iter()
        .map(|p| HashedPath::parse(p))
        .collect::<Result<Vec<_>, _>>()?;
    for pattern in &pauses {
        root.set_state(pattern, SuspensionState::Paused);
    }

    let report = Simulation::new(&root, &config, &args)?.run(&args, &pauses)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Callback counter of one listener, kept after the listener is gone.
struct Tracked {
    owner: String,
    processor: String,
    flavor: &'static str,
    callbacks: Arc<AtomicU64>,
    removed: bool,
}

impl Tracked {
    fn new(owner: String, processor: &str, flavor: &'static str) -> Self {
        Self {
            owner,
            processor: processor.to_string(),
            flavor,
            callbacks: Arc::new(AtomicU64::new(0)),
            removed: false,
        }
    }

    fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.callbacks)
    }
}

/// A processor in the rack and the editor listeners watching it.
///
/// Owned by the UI thread; the audio thread only sees the processor.
struct RackEntry {
    processor: Arc<Processor>,
    tracked: [usize; 3],
    _attribute: AttributeListener,
    _bypass: BypassListener,
    _other: OtherChangeListener,
}

struct Simulation {
    name: Option<String>,
    root: RootObject,
    attributes: usize,
    flush_interval: Duration,
    high_priority_interval: Duration,
    entries: Vec<RackEntry>,
    rack: Arc<ArcSwap<Vec<Arc<Processor>>>>,
    tracked: Vec<Tracked>,
    next_id: usize,
    added: usize,
    removed: usize,
    automation: CustomAutomationManager,
    _value_listener: ValueListener,
}

impl Simulation {
    fn new(root: &RootObject, config: &DispatchConfig, args: &SimulateArgs) -> anyhow::Result<Self> {
        let automation = CustomAutomationManager::new(root);
        let master = automation.add_source("master", 0.0)?;

        let value = Tracked::new("meter".to_string(), "master", "value");
        let counter = value.counter();
        let mut value_listener = ValueListener::new(root, "meter", move |_, _| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        master.add_value_listener(&mut value_listener, false, DispatchType::Async)?;

        let mut sim = Self {
            name: config.name.clone(),
            root: root.clone(),
            attributes: args.attributes,
            flush_interval: config.timer.flush_interval(),
            high_priority_interval: config.timer.high_priority_interval(),
            entries: Vec::with_capacity(args.processors),
            rack: Arc::new(ArcSwap::from_pointee(Vec::new())),
            tracked: vec![value],
            next_id: 0,
            added: 0,
            removed: 0,
            automation,
            _value_listener: value_listener,
        };
        for _ in 0..args.processors {
            sim.add_processor()?;
        }
        sim.publish();
        Ok(sim)
    }

    fn add_processor(&mut self) -> anyhow::Result<()> {
        let id = format!("proc{}", self.next_id);
        self.next_id += 1;
        let processor = Arc::new(Processor::with_attributes(&self.root, &id, self.attributes)?);

        let base = self.tracked.len();
        let attribute = Tracked::new(format!("{id}-editor"), &id, "attribute");
        let bypass = Tracked::new(format!("{id}-bypass-led"), &id, "bypass");
        let other = Tracked::new(format!("{id}-preset-browser"), &id, "other");

        let counter = attribute.counter();
        let mut attribute_listener =
            AttributeListener::new(&self.root, attribute.owner.clone(), move |_, _| {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        let slots: Vec<usize> = (0..self.attributes).collect();
        processor.add_attribute_listener(&mut attribute_listener, &slots, DispatchType::Async)?;

        let counter = bypass.counter();
        let mut bypass_listener =
            BypassListener::new(&self.root, bypass.owner.clone(), move |_, _| {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        processor.add_bypass_listener(&mut bypass_listener, DispatchType::AsyncHighPriority)?;

        let counter = other.counter();
        let mut other_listener = OtherChangeListener::new(
            &self.root,
            other.owner.clone(),
            ProcessorChangeEvent::Preset,
            move |_, _| {
                counter.fetch_add(1, Ordering::Relaxed);
            },
        );
        processor.add_other_change_listener(&mut other_listener, DispatchType::Async)?;

        self.tracked.extend([attribute, bypass, other]);
        self.entries.push(RackEntry {
            processor,
            tracked: [base, base + 1, base + 2],
            _attribute: attribute_listener,
            _bypass: bypass_listener,
            _other: other_listener,
        });
        self.added += 1;
        tracing::debug!(id = %id, "processor added");
        Ok(())
    }

    /// Replace the oldest processor with a new one.
    fn churn(&mut self) -> anyhow::Result<()> {
        if !self.entries.is_empty() {
            let entry = self.entries.remove(0);
            for &index in &entry.tracked {
                self.tracked[index].removed = true;
            }
            // Unpublish before dropping so the audio thread stops producing
            // for it; its listeners deregister as the entry drops.
            self.publish();
            tracing::debug!(id = %entry.processor.id(), "processor removed");
            drop(entry);
            self.removed += 1;
        }
        self.add_processor()?;
        self.publish();
        Ok(())
    }

    fn publish(&self) {
        let snapshot = self.entries.iter().map(|e| Arc::clone(&e.processor)).collect();
        self.rack.store(Arc::new(snapshot));
    }

    fn run(mut self, args: &SimulateArgs, pauses: &[HashedPath]) -> anyhow::Result<SimulationReport> {
        let progress = Arc::new(AtomicUsize::new(0));
        let block_period = Duration::from_secs_f64(args.block_size as f64 / f64::from(args.sample_rate));

        tracing::info!(
            processors = args.processors,
            attributes = args.attributes,
            blocks = args.blocks,
            realtime = args.realtime,
            "simulation started"
        );

        let audio = {
            let producer = AudioProducer {
                rack: Arc::clone(&self.rack),
                master: self.automation.source_by_name("master")?,
                progress: Arc::clone(&progress),
                attributes: args.attributes,
                changes_per_block: args.changes_per_block,
                rng: XorShift::new(args.seed),
            };
            let blocks = args.blocks;
            let period = args.realtime.then_some(block_period);
            thread::Builder::new()
                .name("audio".to_string())
                .spawn(move || producer.render(blocks, period))?
        };

        let start = Instant::now();
        let mut flushed = FlushStats::default();
        let mut full_flushes = 0usize;
        let mut high_priority_flushes = 0usize;
        let mut resumed = pauses.is_empty();
        let mut next_flush = start + self.flush_interval;
        let mut next_high_priority = start + self.high_priority_interval;

        while !audio.is_finished() {
            let now = Instant::now();
            if now >= next_flush {
                flushed += self.root.flush_queues(DispatchThread::Ui);
                full_flushes += 1;
                next_flush = now + self.flush_interval;
                next_high_priority = now + self.high_priority_interval;
                if args.churn_every > 0 && full_flushes % args.churn_every == 0 {
                    self.churn()?;
                }
            } else if now >= next_high_priority {
                flushed += self.root.flush_high_priority_queues(DispatchThread::Ui);
                high_priority_flushes += 1;
                next_high_priority = now + self.high_priority_interval;
            }

            if !resumed && progress.load(Ordering::Relaxed) >= args.blocks / 2 {
                resume(&self.root, pauses);
                resumed = true;
            }

            let wake = next_flush.min(next_high_priority);
            thread::sleep(wake.saturating_duration_since(Instant::now()));
        }

        if audio.join().is_err() {
            anyhow::bail!("audio thread panicked");
        }
        if !resumed {
            resume(&self.root, pauses);
        }
        flushed += self.root.flush_queues(DispatchThread::Ui);
        full_flushes += 1;

        let elapsed = start.elapsed();
        tracing::info!(
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            callbacks = flushed.callbacks,
            "simulation finished"
        );

        Ok(SimulationReport {
            name: self.name.take(),
            blocks: args.blocks,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
            processors_added: self.added,
            processors_removed: self.removed,
            full_flushes,
            high_priority_flushes,
            flushed_listeners: flushed.listeners,
            flushed_callbacks: flushed.callbacks,
            listeners: self.tracked.iter().map(ListenerReport::from).collect(),
            stats: self.root.dispatch_stats().into(),
        })
    }
}

fn resume(root: &RootObject, pauses: &[HashedPath]) {
    for pattern in pauses {
        root.set_state(pattern, SuspensionState::Running);
    }
    tracing::info!(paths = pauses.len(), "paused paths resumed");
}

/// Everything the audio thread touches.
struct AudioProducer {
    rack: Arc<ArcSwap<Vec<Arc<Processor>>>>,
    master: CustomAutomationSource,
    progress: Arc<AtomicUsize>,
    attributes: usize,
    changes_per_block: usize,
    rng: XorShift,
}

impl AudioProducer {
    fn render(mut self, blocks: usize, period: Option<Duration>) {
        for block in 0..blocks {
            let deadline = period.map(|p| Instant::now() + p);

            let rack = self.rack.load();
            for processor in rack.iter() {
                for _ in 0..self.changes_per_block {
                    let slot = self.rng.below(self.attributes);
                    processor.set_attribute(slot, self.rng.unit(), DispatchType::Async);
                }
                if block % BYPASS_EVERY == BYPASS_EVERY - 1 {
                    processor.set_bypassed(!processor.is_bypassed(), DispatchType::Async);
                }
                if block % PRESET_EVERY == PRESET_EVERY - 1 {
                    processor.send_change_message(ProcessorChangeEvent::Preset, DispatchType::Async);
                }
            }
            self.master.set_value(block as f32 / blocks as f32, DispatchType::Async);

            self.progress.store(block + 1, Ordering::Relaxed);
            match deadline {
                Some(deadline) => thread::sleep(deadline.saturating_duration_since(Instant::now())),
                None => thread::yield_now(),
            }
        }
    }
}

/// Small deterministic generator for the change pattern.
struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }

    fn unit(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }
}

#[derive(Serialize)]
struct SimulationReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    blocks: usize,
    elapsed_ms: f64,
    processors_added: usize,
    processors_removed: usize,
    full_flushes: usize,
    high_priority_flushes: usize,
    flushed_listeners: usize,
    flushed_callbacks: usize,
    listeners: Vec<ListenerReport>,
    stats: StatsReport,
}

#[derive(Serialize)]
struct ListenerReport {
    owner: String,
    processor: String,
    flavor: &'static str,
    callbacks: u64,
    removed: bool,
}

impl From<&Tracked> for ListenerReport {
    fn from(tracked: &Tracked) -> Self {
        Self {
            owner: tracked.owner.clone(),
            processor: tracked.processor.clone(),
            flavor: tracked.flavor,
            callbacks: tracked.callbacks.load(Ordering::Relaxed),
            removed: tracked.removed,
        }
    }
}

#[derive(Serialize)]
struct StatsReport {
    sync_callbacks: u64,
    queued: u64,
    dropped_while_suspended: u64,
    catch_ups: u64,
    queue_overflows: u64,
    flushed_callbacks: u64,
}

impl From<DispatchStats> for StatsReport {
    fn from(stats: DispatchStats) -> Self {
        Self {
            sync_callbacks: stats.sync_callbacks,
            queued: stats.queued,
            dropped_while_suspended: stats.dropped_while_suspended,
            catch_ups: stats.catch_ups,
            queue_overflows: stats.queue_overflows,
            flushed_callbacks: stats.flushed_callbacks,
        }
    }
}

fn print_report(report: &SimulationReport) {
    println!("Simulation Report");
    println!("=================");
    println!();
    println!("Blocks:          {}", report.blocks);
    println!("Elapsed:         {:.1} ms", report.elapsed_ms);
    println!(
        "Processors:      {} added, {} removed",
        report.processors_added, report.processors_removed
    );
    println!(
        "Flushes:         {} full, {} high priority",
        report.full_flushes, report.high_priority_flushes
    );
    println!(
        "Delivered:       {} callbacks to {} listeners",
        report.flushed_callbacks, report.flushed_listeners
    );
    println!();

    println!("Listeners:");
    for listener in &report.listeners {
        println!(
            "  {:28} {:10} {:>8}{}",
            listener.owner,
            listener.flavor,
            listener.callbacks,
            if listener.removed { "  (removed)" } else { "" }
        );
    }
    println!();

    let stats = &report.stats;
    println!("Root Statistics:");
    println!("  sync callbacks:           {}", stats.sync_callbacks);
    println!("  queued:                   {}", stats.queued);
    println!("  dropped while suspended:  {}", stats.dropped_while_suspended);
    println!("  catch-ups:                {}", stats.catch_ups);
    println!("  queue overflows:          {}", stats.queue_overflows);
    println!("  flushed callbacks:        {}", stats.flushed_callbacks);
}
