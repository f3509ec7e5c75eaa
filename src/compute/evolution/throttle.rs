//! Fitness change listeners and the notification rate limiter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::schema::Measure;

/// A confirmed improvement of the externally visible best.
#[derive(Debug, Clone, PartialEq)]
pub struct FitnessChangeEvent {
    pub measure: Measure,
    pub raw: f64,
    pub adjusted: f64,
    /// Key of the improving genotype.
    pub genotype: String,
    pub iteration: usize,
}

/// Receiver of fitness change events.
pub trait FitnessListener: Send + Sync {
    fn fitness_changed(&self, event: &FitnessChangeEvent);
}

impl<F> FitnessListener for F
where
    F: Fn(&FitnessChangeEvent) + Send + Sync,
{
    fn fitness_changed(&self, event: &FitnessChangeEvent) {
        self(event)
    }
}

/// Handle returned by [`ListenerRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Subscribed listeners.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn FitnessListener>)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn FitnessListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, listener));
        id
    }

    /// Remove a listener; returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(other, _)| *other != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Current listeners, cloned out so delivery happens without this lock.
    pub fn snapshot(&self) -> Vec<Arc<dyn FitnessListener>> {
        self.lock().iter().map(|(_, l)| Arc::clone(l)).collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(ListenerId, Arc<dyn FitnessListener>)>> {
        self.listeners.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

#[derive(Debug)]
struct NotificationState {
    last_sent: Option<Instant>,
    last_fitness: f64,
}

/// Rate limiter for fitness change notifications.
///
/// `interval` is in seconds: negative never notifies, zero notifies on every
/// call and a positive value notifies at most once per interval. Events not
/// better than the last delivered one are dropped, so listeners see a strictly
/// increasing sequence.
#[derive(Debug)]
pub struct NotificationThrottle {
    interval: i64,
    state: Mutex<NotificationState>,
}

impl NotificationThrottle {
    pub fn new(interval: i64) -> Self {
        Self {
            interval,
            state: Mutex::new(NotificationState {
                last_sent: None,
                last_fitness: f64::NEG_INFINITY,
            }),
        }
    }

    pub fn interval(&self) -> i64 {
        self.interval
    }

    pub fn maybe_notify(
        &self,
        event: &FitnessChangeEvent,
        listeners: &[Arc<dyn FitnessListener>],
    ) -> bool {
        self.maybe_notify_at(Instant::now(), event, listeners)
    }

    /// Deliver `event` if the throttle allows it at `now`; returns whether it was delivered.
    pub fn maybe_notify_at(
        &self,
        now: Instant,
        event: &FitnessChangeEvent,
        listeners: &[Arc<dyn FitnessListener>],
    ) -> bool {
        if self.interval < 0 {
            return false;
        }

        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if event.adjusted <= state.last_fitness {
            return false;
        }
        if self.interval > 0
            && let Some(last) = state.last_sent
            && now.saturating_duration_since(last) < Duration::from_secs(self.interval as u64)
        {
            log::debug!(
                "Suppressing notification for {}, last sent {:?} ago",
                event.adjusted,
                now.saturating_duration_since(last)
            );
            return false;
        }

        for listener in listeners {
            listener.fitness_changed(event);
        }
        state.last_sent = Some(now);
        state.last_fitness = event.adjusted;
        true
    }

    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.last_sent = None;
        state.last_fitness = f64::NEG_INFINITY;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(adjusted: f64) -> FitnessChangeEvent {
        FitnessChangeEvent {
            measure: Measure::RootMeanSquaredError,
            raw: -adjusted,
            adjusted,
            genotype: "1".into(),
            iteration: 0,
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<f64>>>, Arc<dyn FitnessListener>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: Arc<dyn FitnessListener> =
            Arc::new(move |e: &FitnessChangeEvent| sink.lock().unwrap().push(e.adjusted));
        (seen, listener)
    }

    #[test]
    fn test_positive_interval_suppresses() {
        let throttle = NotificationThrottle::new(5);
        let (seen, listener) = recorder();
        let start = Instant::now();
        assert!(throttle.maybe_notify_at(start, &event(-0.8), &[Arc::clone(&listener)]));
        assert!(!throttle.maybe_notify_at(
            start + Duration::from_secs(2),
            &event(-0.7),
            &[Arc::clone(&listener)]
        ));
        assert_eq!(*seen.lock().unwrap(), vec![-0.8]);

        // after the interval has passed the next improvement goes through
        assert!(throttle.maybe_notify_at(
            start + Duration::from_secs(6),
            &event(-0.6),
            &[listener]
        ));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_zero_interval_delivers_all() {
        let throttle = NotificationThrottle::new(0);
        let (seen, listener) = recorder();
        let listeners = [listener];
        for raw in [0.80, 0.85, 0.90] {
            // increasing accuracy-like values
            assert!(throttle.maybe_notify(&event(raw), &listeners));
        }
        assert_eq!(*seen.lock().unwrap(), vec![0.80, 0.85, 0.90]);
    }

    #[test]
    fn test_error_measure_sequence_requires_adjusted_increase() {
        let throttle = NotificationThrottle::new(0);
        let (seen, listener) = recorder();
        let listeners = [listener];
        // raw errors 0.90 -> 0.85 -> 0.80 are improvements
        for raw in [0.90, 0.85, 0.80] {
            assert!(throttle.maybe_notify(&event(-raw), &listeners));
        }
        assert_eq!(*seen.lock().unwrap(), vec![-0.90, -0.85, -0.80]);
    }

    #[test]
    fn test_negative_interval_never_notifies() {
        let throttle = NotificationThrottle::new(-1);
        let (seen, listener) = recorder();
        let listeners = [listener];
        for i in 0..10 {
            assert!(!throttle.maybe_notify(&event(i as f64), &listeners));
        }
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stale_events_dropped() {
        let throttle = NotificationThrottle::new(0);
        let (seen, listener) = recorder();
        let listeners = [listener];
        assert!(throttle.maybe_notify(&event(2.0), &listeners));
        assert!(!throttle.maybe_notify(&event(1.0), &listeners));
        assert!(!throttle.maybe_notify(&event(2.0), &listeners));
        assert_eq!(*seen.lock().unwrap(), vec![2.0]);
    }

    #[test]
    fn test_registry_subscribe_unsubscribe() {
        let registry = ListenerRegistry::new();
        let (_, a) = recorder();
        let (_, b) = recorder();
        let id_a = registry.subscribe(a);
        let id_b = registry.subscribe(b);
        assert_ne!(id_a, id_b);
        assert_eq!(registry.len(), 2);
        assert!(registry.unsubscribe(id_a));
        assert!(!registry.unsubscribe(id_a));
        assert_eq!(registry.snapshot().len(), 1);
    }
}
