//! The capture loop: polls the monitoring page's metric elements once per
//! interval and writes one space-joined line per sample to the experiment's
//! stats file.
//!
//! The loop is generic over [`MetricSource`] so the file-handling invariants
//! can be exercised without a browser; [`crate::ChromeDriver`] is the
//! production source.

use crate::error::Result;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// DOM ids of the five metric elements on the monitoring page, in the order
/// their values appear on each output line.
pub const METRIC_ELEMENT_IDS: [&str; 5] = [
    "time",
    "bufferLevel",
    "framerate",
    "reportedBitrate",
    "averagethroughput",
];

/// How long to wait for the metric elements to appear after navigation.
const METRIC_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// The minimal automation contract the sampler needs from a browser backend:
/// navigate somewhere, wait until the metric elements exist, read an element's
/// current text. Substituting another automation library means implementing
/// exactly these three operations.
#[allow(async_fn_in_trait)]
pub trait MetricSource {
    async fn navigate(&self, url: &str) -> Result<()>;
    async fn wait_for_metrics(&self, ids: &[&str], timeout: Duration) -> Result<()>;
    async fn element_text(&self, id: &str) -> Result<String>;
}

/// Capture parameters for one experiment run.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Experiment identifier, used verbatim as the stats file prefix.
    /// Callers must supply a filesystem-safe, non-empty value.
    pub experiment_id: String,
    /// URL of the monitoring page to sample.
    pub page_url: String,
    /// Number of samples to record.
    pub duration: u32,
    /// Directory the stats file is written into (created if absent).
    pub output_dir: PathBuf,
    /// Pause between samples (default: 1 second).
    pub interval: Duration,
}

impl SamplerConfig {
    pub fn new(experiment_id: impl Into<String>, page_url: impl Into<String>, duration: u32) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            page_url: page_url.into(),
            duration,
            output_dir: PathBuf::from("."),
            interval: Duration::from_secs(1),
        }
    }

    /// Path of the stats file this run produces.
    pub fn stats_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_stats.txt", self.experiment_id))
    }
}

/// One point-in-time reading of the five metrics, kept as the raw strings the
/// page displayed (possibly empty or partially updated).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRecord {
    pub time: String,
    pub buffer_level: String,
    pub framerate: String,
    pub reported_bitrate: String,
    pub average_throughput: String,
}

impl SampleRecord {
    /// The stats-file representation: five space-joined fields, fixed order.
    pub fn as_line(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.time,
            self.buffer_level,
            self.framerate,
            self.reported_bitrate,
            self.average_throughput
        )
    }
}

/// Stats file handle that deletes the file on drop unless the run committed it.
///
/// This is the all-or-nothing guarantee: a stats file that exists on disk
/// always holds the full requested number of samples.
struct StatsWriter {
    file: BufWriter<File>,
    path: PathBuf,
    committed: bool,
}

impl StatsWriter {
    /// Create (truncating) the stats file. Reruns with the same experiment id
    /// fully overwrite the previous file.
    fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            file: BufWriter::new(file),
            path: path.to_path_buf(),
            committed: false,
        })
    }

    fn write_record(&mut self, record: &SampleRecord) -> Result<()> {
        writeln!(self.file, "{}", record.as_line())?;
        Ok(())
    }

    /// Flush and keep the file.
    fn commit(mut self) -> Result<()> {
        self.file.flush()?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StatsWriter {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Run one sampling experiment: navigate to the configured page, wait for the
/// metric elements, then record `duration` samples at the configured interval.
///
/// Returns the stats file path on success. On any failure after the file was
/// created, the partial file is removed before the error propagates; failures
/// before that point leave nothing on disk.
pub async fn capture<S: MetricSource>(source: &S, config: &SamplerConfig) -> Result<PathBuf> {
    source.navigate(&config.page_url).await?;
    source
        .wait_for_metrics(&METRIC_ELEMENT_IDS, METRIC_WAIT_TIMEOUT)
        .await?;

    fs::create_dir_all(&config.output_dir)?;
    let path = config.stats_path();
    let mut writer = StatsWriter::create(&path)?;
    log::info!(
        "Recording {} samples for experiment '{}' to {}",
        config.duration,
        config.experiment_id,
        path.display()
    );

    for sample in 0..config.duration {
        let record = read_record(source).await?;
        writer.write_record(&record)?;
        log::debug!(
            "Sample {}/{}: {}",
            sample + 1,
            config.duration,
            record.as_line()
        );
        tokio::time::sleep(config.interval).await;
    }

    writer.commit()?;
    Ok(path)
}

/// Read all five metrics, in output order.
async fn read_record<S: MetricSource>(source: &S) -> Result<SampleRecord> {
    let [time, buffer_level, framerate, reported_bitrate, average_throughput] = METRIC_ELEMENT_IDS;

    Ok(SampleRecord {
        time: source.element_text(time).await?,
        buffer_level: source.element_text(buffer_level).await?,
        framerate: source.element_text(framerate).await?,
        reported_bitrate: source.element_text(reported_bitrate).await?,
        average_throughput: source.element_text(average_throughput).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SampleRecord {
        SampleRecord {
            time: "00:01".to_string(),
            buffer_level: "2.0s".to_string(),
            framerate: "30fps".to_string(),
            reported_bitrate: "500kbps".to_string(),
            average_throughput: "480kbps".to_string(),
        }
    }

    #[test]
    fn record_line_is_space_joined_in_fixed_order() {
        assert_eq!(record().as_line(), "00:01 2.0s 30fps 500kbps 480kbps");
    }

    #[test]
    fn empty_fields_still_produce_five_field_slots() {
        let mut r = record();
        r.framerate = String::new();
        // Four separators remain even when a field is empty
        assert_eq!(r.as_line().matches(' ').count(), 4);
    }

    #[test]
    fn stats_path_uses_experiment_id_prefix() {
        let mut config = SamplerConfig::new("exp1", "http://host/page", 3);
        config.output_dir = PathBuf::from("/tmp/out");
        assert_eq!(config.stats_path(), PathBuf::from("/tmp/out/exp1_stats.txt"));
    }

    #[test]
    fn uncommitted_writer_removes_file_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exp_stats.txt");

        let mut writer = StatsWriter::create(&path).unwrap();
        writer.write_record(&record()).unwrap();
        assert!(path.exists());
        drop(writer);

        assert!(!path.exists());
    }

    #[test]
    fn committed_writer_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exp_stats.txt");

        let mut writer = StatsWriter::create(&path).unwrap();
        writer.write_record(&record()).unwrap();
        writer.commit().unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "00:01 2.0s 30fps 500kbps 480kbps\n");
    }

    #[test]
    fn create_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exp_stats.txt");
        fs::write(&path, "stale line\nstale line\n").unwrap();

        let writer = StatsWriter::create(&path).unwrap();
        writer.commit().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }
}
