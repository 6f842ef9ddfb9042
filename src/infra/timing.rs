use std::time::{Duration, Instant};

/// Run `f`, log how long it took under `label`, and return its result along
/// with the elapsed time.
pub fn timed<T>(label: &str, f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let result = f();
    let elapsed = start.elapsed();
    tracing::info!("{} done in {:.3}s", label, elapsed.as_secs_f64());
    (result, elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timed_returns_result() {
        let (value, elapsed) = timed("sleep", || {
            std::thread::sleep(Duration::from_millis(5));
            42
        });
        assert_eq!(value, 42);
        assert!(elapsed >= Duration::from_millis(5));
    }
}
