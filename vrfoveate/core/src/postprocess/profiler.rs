use crate::{constants::*, graphics::*, StrResult};
use log::info;
use std::{thread, time::Duration};

const TRACE_CONTEXT: &str = "Profiler";

// Ring of GPU timers. Reading a slot right after ending it would stall until the GPU catches
// up, so the oldest slot is read instead.
pub struct GpuProfiler<B: Backend> {
    timers: Vec<B::Timer>,
    issued: Vec<bool>,
    current: usize,
    total_ms: f32,
    samples: u32,
}

impl<B: Backend> GpuProfiler<B> {
    pub fn new(backend: &B) -> StrResult<Self> {
        let timers = (0..PROFILE_QUERY_COUNT)
            .map(|_| trace_err!(backend.create_timer(), "Creating profiling queries"))
            .collect::<StrResult<Vec<_>>>()?;

        Ok(Self {
            timers,
            issued: vec![false; PROFILE_QUERY_COUNT],
            current: 0,
            total_ms: 0.,
            samples: 0,
        })
    }

    pub fn begin(&self, backend: &B) {
        backend.begin_timer(&self.timers[self.current]);
    }

    /// Ends the current measurement and collects the oldest one. Every
    /// `PROFILE_LOG_INTERVAL_SAMPLES` samples the average frame cost in milliseconds (both eyes)
    /// is logged and returned.
    pub fn end(&mut self, backend: &B) -> Option<f32> {
        backend.end_timer(&self.timers[self.current]);
        self.issued[self.current] = true;
        self.current = (self.current + 1) % self.timers.len();

        if !self.issued[self.current] {
            return None;
        }

        let elapsed = loop {
            match backend.poll_timer(&self.timers[self.current]) {
                TimerPoll::Pending => thread::sleep(Duration::from_millis(1)),
                TimerPoll::Disjoint => break None,
                TimerPoll::Elapsed(duration) => break Some(duration),
            }
        };

        if let Some(duration) = elapsed {
            self.total_ms += duration.as_secs_f32() * 1000.;
            self.samples += 1;
        }

        if self.samples >= PROFILE_LOG_INTERVAL_SAMPLES {
            let average = self.total_ms / self.samples as f32 * 2.;
            info!("Average post-processing time: {:.3} ms", average);
            self.total_ms = 0.;
            self.samples = 0;

            Some(average)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::mock::*;

    fn frame(profiler: &mut GpuProfiler<MockBackend>, backend: &MockBackend) -> Option<f32> {
        profiler.begin(backend);
        profiler.end(backend)
    }

    #[test]
    fn reports_every_interval() {
        let backend = MockBackend::new();
        let mut profiler = GpuProfiler::new(&backend).unwrap();
        assert_eq!(backend.live_objects(), PROFILE_QUERY_COUNT);

        // The first slots have nothing to read back yet
        for _ in 0..PROFILE_QUERY_COUNT - 1 {
            assert_eq!(frame(&mut profiler, &backend), None);
        }
        for _ in 0..PROFILE_LOG_INTERVAL_SAMPLES - 1 {
            assert_eq!(frame(&mut profiler, &backend), None);
        }
        let average = frame(&mut profiler, &backend).unwrap();
        assert!((average - 0.5).abs() < 1e-4);

        assert_eq!(frame(&mut profiler, &backend), None);
    }

    #[test]
    fn disjoint_samples_are_dropped() {
        let backend = MockBackend::new();
        let mut profiler = GpuProfiler::new(&backend).unwrap();
        backend.set_disjoint_timers(true);
        for _ in 0..PROFILE_LOG_INTERVAL_SAMPLES as usize + PROFILE_QUERY_COUNT {
            assert_eq!(frame(&mut profiler, &backend), None);
        }
        assert_eq!(profiler.samples, 0);
    }

    #[test]
    fn creation_failure() {
        let backend = MockBackend::new();
        backend.fail_next(MockCall::CreateTimer);
        assert!(GpuProfiler::new(&backend).is_err());
        assert_eq!(backend.live_objects(), 0);
    }
}
