use crossbeam_channel::{Receiver, Sender};

use crate::backend::{EncoderId, GpuBackend, MapError, QuerySetId, TimestampWritesDesc};
use crate::error::GfxResult;
use crate::resource::Buffer;

const QUERY_COUNT: u32 = 2;
const TIMESTAMP_BYTES: u64 = 8 * QUERY_COUNT as u64;

/// Readback progress of the timestamp pair.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TimingState {
    Idle,
    /// Resolve and copy recorded; waiting for submission.
    ResolvePending,
    /// Map requested; waiting for the driver callback.
    MapPending,
}

/// Measures GPU time between the start and end of render passes.
///
/// Each frame the begin/end timestamps are resolved into a buffer, copied to a
/// mappable buffer and read back asynchronously. Only one readback is in
/// flight at a time; frames finishing while a map is pending are not sampled.
pub struct GpuTiming {
    query_set: QuerySetId,
    resolve_buffer: Buffer,
    readback_buffer: Buffer,
    state: TimingState,
    period_ns: f32,
    map_tx: Sender<Result<(), MapError>>,
    map_rx: Receiver<Result<(), MapError>>,
    sum_us: f64,
    samples: u32,
}

impl std::fmt::Debug for GpuTiming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuTiming")
            .field("state", &self.state)
            .field("samples", &self.samples)
            .finish_non_exhaustive()
    }
}

impl GpuTiming {
    /// Returns `None` (with a warning) when the device has no timestamp queries.
    pub fn new<B: GpuBackend>(backend: &mut B) -> GfxResult<Option<Self>> {
        if !backend.supports_timestamps() {
            log::warn!("timestamp queries unsupported; GPU timing disabled");
            return Ok(None);
        }

        let query_set = backend.create_timestamp_query_set("gpu timing queries", QUERY_COUNT)?;
        let resolve_buffer = Buffer::new(
            backend,
            "gpu timing resolve",
            wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            TIMESTAMP_BYTES,
        )?;
        let readback_buffer = Buffer::new(
            backend,
            "gpu timing readback",
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            TIMESTAMP_BYTES,
        )?;
        let (map_tx, map_rx) = crossbeam_channel::bounded(1);

        Ok(Some(Self {
            query_set,
            resolve_buffer,
            readback_buffer,
            state: TimingState::Idle,
            period_ns: backend.timestamp_period(),
            map_tx,
            map_rx,
            sum_us: 0.0,
            samples: 0,
        }))
    }

    pub fn state(&self) -> TimingState {
        self.state
    }

    /// Timestamp writes to attach to a render pass.
    pub fn timestamp_writes(&self) -> TimestampWritesDesc {
        TimestampWritesDesc {
            query_set: self.query_set,
            beginning_of_pass_write_index: 0,
            end_of_pass_write_index: 1,
        }
    }

    /// Records the query resolve and the copy into the readback buffer.
    ///
    /// Skipped unless idle, so a pending map is never written to.
    pub fn resolve_timestamps<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        encoder: EncoderId,
    ) -> GfxResult<()> {
        if self.state != TimingState::Idle {
            return Ok(());
        }
        backend.resolve_query_set(encoder, self.query_set, 0..QUERY_COUNT, self.resolve_buffer.id(), 0)?;
        backend.copy_buffer_to_buffer(
            encoder,
            self.resolve_buffer.id(),
            0,
            self.readback_buffer.id(),
            0,
            TIMESTAMP_BYTES,
        )?;
        self.state = TimingState::ResolvePending;
        Ok(())
    }

    /// Requests the asynchronous map once the resolve has been submitted.
    pub fn fetch_timestamps<B: GpuBackend>(&mut self, backend: &mut B) {
        if self.state != TimingState::ResolvePending {
            return;
        }
        let tx = self.map_tx.clone();
        backend.map_buffer_read(
            self.readback_buffer.id(),
            0..TIMESTAMP_BYTES,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        self.state = TimingState::MapPending;
    }

    /// Drops a resolve whose encoder was never submitted.
    pub fn discard_resolve(&mut self) {
        if self.state == TimingState::ResolvePending {
            self.state = TimingState::Idle;
        }
    }

    /// Consumes a completed map, if any, and records its sample.
    pub fn poll_completed<B: GpuBackend>(&mut self, backend: &mut B) {
        let Ok(result) = self.map_rx.try_recv() else {
            return;
        };
        match result {
            Ok(()) => {
                match backend.read_mapped(self.readback_buffer.id(), 0..TIMESTAMP_BYTES) {
                    Ok(bytes) => self.record(&bytes),
                    Err(e) => log::warn!("timestamp readback failed: {e}"),
                }
                backend.unmap_buffer(self.readback_buffer.id());
            }
            Err(e) => log::warn!("timestamp map failed, sample skipped: {e}"),
        }
        self.state = TimingState::Idle;
    }

    fn record(&mut self, bytes: &[u8]) {
        let (Some(start), Some(end)) = (read_u64(bytes, 0), read_u64(bytes, 8)) else {
            log::warn!("timestamp readback returned {} bytes", bytes.len());
            return;
        };
        let ticks = end.saturating_sub(start);
        self.sum_us += ticks as f64 * f64::from(self.period_ns) / 1000.0;
        self.samples += 1;
    }

    /// Number of samples accumulated since the last average was taken.
    pub fn sample_count(&self) -> u32 {
        self.samples
    }

    /// Mean GPU time in microseconds since the previous call; resets the accumulator.
    pub fn average_gpu_time_us(&mut self) -> f32 {
        if self.samples == 0 {
            return 0.0;
        }
        let average = self.sum_us / f64::from(self.samples);
        self.sum_us = 0.0;
        self.samples = 0;
        average as f32
    }

    pub fn dispose<B: GpuBackend>(self, backend: &mut B) {
        backend.release_query_set(self.query_set);
        self.resolve_buffer.dispose(backend);
        self.readback_buffer.dispose(backend);
    }
}

fn read_u64(bytes: &[u8], at: usize) -> Option<u64> {
    let raw: [u8; 8] = bytes.get(at..at + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, RecordingBackend};

    fn cycle(timing: &mut GpuTiming, backend: &mut RecordingBackend) {
        let encoder = backend.create_command_encoder("enc").unwrap();
        timing.resolve_timestamps(backend, encoder).unwrap();
        let cb = backend.finish_encoder(encoder).unwrap();
        backend.submit(&[cb]).unwrap();
        timing.fetch_timestamps(backend);
        backend.poll();
        timing.poll_completed(backend);
    }

    #[test]
    fn disabled_without_timestamp_support() {
        let mut backend = RecordingBackend::new().with_timestamps(false);
        assert!(GpuTiming::new(&mut backend).unwrap().is_none());
    }

    #[test]
    fn elapsed_ticks_scale_by_period() {
        let mut backend = RecordingBackend::new().with_timestamp_period(2.0);
        let mut timing = GpuTiming::new(&mut backend).unwrap().unwrap();
        backend.set_next_timestamps(1_000, 4_000);
        cycle(&mut timing, &mut backend);
        assert_eq!(timing.state(), TimingState::Idle);
        // 3000 ticks * 2 ns = 6 us
        assert_eq!(timing.average_gpu_time_us(), 6.0);
    }

    #[test]
    fn failed_map_skips_the_sample() {
        let mut backend = RecordingBackend::new();
        let mut timing = GpuTiming::new(&mut backend).unwrap().unwrap();
        backend.fail_next_map();
        cycle(&mut timing, &mut backend);
        assert_eq!(timing.state(), TimingState::Idle);
        assert_eq!(timing.sample_count(), 0);
        assert_eq!(backend.count_where(|c| matches!(c, Command::UnmapBuffer(_))), 0);
    }

    #[test]
    fn unsubmitted_resolve_is_discarded() {
        let mut backend = RecordingBackend::new();
        let mut timing = GpuTiming::new(&mut backend).unwrap().unwrap();
        let encoder = backend.create_command_encoder("dropped").unwrap();
        timing.resolve_timestamps(&mut backend, encoder).unwrap();
        assert_eq!(timing.state(), TimingState::ResolvePending);

        timing.discard_resolve();
        assert_eq!(timing.state(), TimingState::Idle);
        cycle(&mut timing, &mut backend);
        assert_eq!(timing.sample_count(), 1);
    }
}
