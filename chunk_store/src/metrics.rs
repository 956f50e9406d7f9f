//! Metrics for chunk store operations.

use std::time::Instant;

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

use crate::ChunkStoreError;

/// Name of the meter the chunk store instruments are registered on.
pub const METER_NAME: &str = "chunk_store";

#[derive(Clone)]
pub struct ChunkStoreMetrics {
    backend: &'static str,
    operations: Histogram<f64>,
    errors: Counter<u64>,
    bytes_written: Counter<u64>,
}

impl ChunkStoreMetrics {
    pub fn new(backend: &'static str, meter: &Meter) -> Self {
        let operations = meter
            .f64_histogram("chunk_store_operation_duration_seconds")
            .with_description("Duration of chunk store operations in seconds")
            .build();

        let errors = meter
            .u64_counter("chunk_store_errors_total")
            .with_description("Total number of failed chunk store operations")
            .build();

        let bytes_written = meter
            .u64_counter("chunk_store_bytes_written_total")
            .with_description("Total number of chunk bytes accepted by the store")
            .build();

        Self {
            backend,
            operations,
            errors,
            bytes_written,
        }
    }

    pub fn start(&self, op: &'static str) -> Timer {
        Timer::start_with_labels(
            &self.operations,
            &[
                KeyValue::new("op", op),
                KeyValue::new("backend", self.backend),
            ],
        )
    }

    pub fn record_error(&self, op: &'static str, err: &ChunkStoreError) {
        self.errors.add(
            1,
            &[
                KeyValue::new("op", op),
                KeyValue::new("backend", self.backend),
                KeyValue::new("kind", err.kind()),
            ],
        );
    }

    pub fn record_written(&self, len: usize) {
        self.bytes_written
            .add(len as u64, &[KeyValue::new("backend", self.backend)]);
    }
}

/// Records the elapsed time into its histogram when dropped.
pub struct Timer {
    start: Instant,
    histogram: Histogram<f64>,
    labels: Vec<KeyValue>,
}

impl Timer {
    pub fn start_with_labels(histogram: &Histogram<f64>, labels: &[KeyValue]) -> Self {
        Self {
            start: Instant::now(),
            histogram: histogram.clone(),
            labels: labels.to_vec(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.record(duration, &self.labels);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use anyhow::Result;
    use bytes::Bytes;
    use opentelemetry::metrics::MeterProvider;
    use opentelemetry_sdk::metrics::{
        InMemoryMetricExporter,
        PeriodicReader,
        SdkMeterProvider,
        data::{AggregatedMetrics, MetricData},
    };
    use tempfile::TempDir;

    use super::*;
    use crate::{ChunkStore, DiskChunkStore, UploadId};

    /// Meter provider whose exports can be read back.
    pub(crate) struct TestMeter {
        pub provider: SdkMeterProvider,
        exporter: InMemoryMetricExporter,
    }

    impl TestMeter {
        pub(crate) fn new() -> Self {
            let exporter = InMemoryMetricExporter::default();
            let provider = SdkMeterProvider::builder()
                .with_reader(PeriodicReader::builder(exporter.clone()).build())
                .build();
            Self { provider, exporter }
        }

        pub(crate) fn meter(&self) -> Meter {
            self.provider.meter(METER_NAME)
        }

        /// Latest exported value of the u64 counter `name`, summed over labels.
        pub(crate) fn counter(&self, name: &str) -> Result<u64> {
            self.provider.force_flush()?;
            let exported = self.exporter.get_finished_metrics()?;
            let value = exported
                .iter()
                .flat_map(|resource| resource.scope_metrics())
                .flat_map(|scope| scope.metrics())
                .filter(|metric| metric.name() == name)
                .filter_map(|metric| match metric.data() {
                    AggregatedMetrics::U64(MetricData::Sum(sum)) => {
                        Some(sum.data_points().map(|point| point.value()).sum::<u64>())
                    }
                    _ => None,
                })
                .last()
                .unwrap_or(0);
            Ok(value)
        }

        pub(crate) fn histogram_count(&self, name: &str) -> Result<u64> {
            self.provider.force_flush()?;
            let exported = self.exporter.get_finished_metrics()?;
            let count = exported
                .iter()
                .flat_map(|resource| resource.scope_metrics())
                .flat_map(|scope| scope.metrics())
                .filter(|metric| metric.name() == name)
                .filter_map(|metric| match metric.data() {
                    AggregatedMetrics::F64(MetricData::Histogram(histogram)) => Some(
                        histogram
                            .data_points()
                            .map(|point| point.count())
                            .sum::<u64>(),
                    ),
                    _ => None,
                })
                .last()
                .unwrap_or(0);
            Ok(count)
        }
    }

    #[tokio::test]
    async fn test_disk_write_records_bytes_and_latency() -> Result<()> {
        let test_meter = TestMeter::new();
        let temp_dir = TempDir::new()?;
        let store = DiskChunkStore::with_metrics(
            temp_dir.path(),
            ChunkStoreMetrics::new("disk", &test_meter.meter()),
        )?;
        let upload = UploadId::new("container", "file");

        store
            .write(&upload, 0, false, Bytes::from_static(b"hello"))
            .await?;
        store
            .write(&upload, 1, true, Bytes::from_static(b"abc"))
            .await?;
        store.exists(&upload, 0).await?;

        assert_eq!(test_meter.counter("chunk_store_bytes_written_total")?, 8);
        assert_eq!(
            test_meter.histogram_count("chunk_store_operation_duration_seconds")?,
            3
        );
        assert_eq!(test_meter.counter("chunk_store_errors_total")?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_operation_counts_error() -> Result<()> {
        let test_meter = TestMeter::new();
        let temp_dir = TempDir::new()?;
        let store = DiskChunkStore::with_metrics(
            temp_dir.path(),
            ChunkStoreMetrics::new("disk", &test_meter.meter()),
        )?;

        // A plain file where the container directory belongs.
        std::fs::write(temp_dir.path().join("container"), b"")?;

        let result = store
            .write(&UploadId::new("container", "file"), 0, true, Bytes::from_static(b"x"))
            .await;

        assert!(result.is_err());
        assert_eq!(test_meter.counter("chunk_store_errors_total")?, 1);
        assert_eq!(test_meter.counter("chunk_store_bytes_written_total")?, 0);
        Ok(())
    }
}
