use std::{
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use dashmap::DashMap;
use tokio::{sync::oneshot, task::JoinHandle, time::sleep};
use tracing::debug;

/// Which automatic transition a timer drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Moves an idle session into its closing window.
    Inactivity,
    /// Deletes a session whose closing window elapsed.
    Finalize,
}

/// Identity of an armed timer, handed to the callback when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerTicket {
    /// Project owning the session.
    pub project_id: String,
    /// Unique per arming; lets a firing timer tell whether it was superseded.
    pub generation: u64,
    /// Transition the timer drives.
    pub kind: TimerKind,
    /// Session version the timer was armed for.
    pub session_version: u64,
}

struct ArmedTimer {
    ticket: TimerTicket,
    handle: JoinHandle<()>,
}

/// Per-project cancellable timers; at most one is armed per project.
#[derive(Default)]
pub struct TimerScheduler {
    timers: DashMap<String, ArmedTimer>,
    generations: AtomicU64,
}

impl TimerScheduler {
    /// Create an empty instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer for `project_id`, cancelling whichever one was armed before.
    ///
    /// `on_fire` receives the ticket and should [`claim`](Self::claim) it before
    /// acting, so a timer replaced while its callback waited does nothing.
    pub fn arm<F, Fut>(
        &self,
        project_id: &str,
        kind: TimerKind,
        session_version: u64,
        delay: Duration,
        on_fire: F,
    ) -> TimerTicket
    where
        F: FnOnce(TimerTicket) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let ticket = TimerTicket {
            project_id: project_id.to_owned(),
            generation,
            kind,
            session_version,
        };

        // The task waits until its entry is registered so a zero delay cannot
        // fire before `claim` is able to find it.
        let (armed_tx, armed_rx) = oneshot::channel::<()>();
        let fired = ticket.clone();
        let handle = tokio::spawn(async move {
            if armed_rx.await.is_err() {
                return;
            }
            sleep(delay).await;
            on_fire(fired).await;
        });

        let previous = self.timers.insert(
            project_id.to_owned(),
            ArmedTimer {
                ticket: ticket.clone(),
                handle,
            },
        );
        if let Some(previous) = previous {
            previous.handle.abort();
            debug!(
                project_id,
                generation = previous.ticket.generation,
                kind = ?previous.ticket.kind,
                "replaced armed timer"
            );
        }
        let _ = armed_tx.send(());

        debug!(project_id, generation, ?kind, ?delay, "armed timer");
        ticket
    }

    /// Take ownership of a firing timer; `false` when it was replaced or cancelled.
    pub fn claim(&self, ticket: &TimerTicket) -> bool {
        self.timers
            .remove_if(&ticket.project_id, |_, armed| {
                armed.ticket.generation == ticket.generation
            })
            .is_some()
    }

    /// Cancel the timer armed for `project_id`, if any.
    pub fn cancel(&self, project_id: &str) -> bool {
        match self.timers.remove(project_id) {
            Some((_, armed)) => {
                armed.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Ticket of the timer currently armed for `project_id`.
    pub fn armed(&self, project_id: &str) -> Option<TimerTicket> {
        self.timers
            .get(project_id)
            .map(|armed| armed.ticket.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::{sync::mpsc, time::timeout};

    use super::*;

    const WAIT: Duration = Duration::from_millis(500);

    fn arm_reporting(
        scheduler: &Arc<TimerScheduler>,
        delay: Duration,
        tx: mpsc::UnboundedSender<(TimerTicket, bool)>,
    ) -> TimerTicket {
        let owner = scheduler.clone();
        scheduler.arm("p1", TimerKind::Inactivity, 1, delay, move |ticket| async move {
            let claimed = owner.claim(&ticket);
            let _ = tx.send((ticket, claimed));
        })
    }

    #[tokio::test]
    async fn armed_timer_fires_and_claims() {
        let scheduler = Arc::new(TimerScheduler::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let ticket = arm_reporting(&scheduler, Duration::from_millis(10), tx);
        assert_eq!(scheduler.armed("p1"), Some(ticket.clone()));

        let (fired, claimed) = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(fired, ticket);
        assert!(claimed);
        assert!(scheduler.armed("p1").is_none());
    }

    #[tokio::test]
    async fn zero_delay_timer_can_still_claim() {
        let scheduler = Arc::new(TimerScheduler::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        arm_reporting(&scheduler, Duration::ZERO, tx);

        let (_, claimed) = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert!(claimed);
    }

    #[tokio::test]
    async fn rearming_cancels_previous_timer() {
        let scheduler = Arc::new(TimerScheduler::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let first = arm_reporting(&scheduler, Duration::from_millis(20), tx.clone());
        let second = arm_reporting(&scheduler, Duration::from_millis(40), tx);
        assert!(second.generation > first.generation);

        let (fired, claimed) = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(fired.generation, second.generation);
        assert!(claimed);

        sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stale_ticket_cannot_claim() {
        let scheduler = TimerScheduler::new();
        let stale = scheduler.arm("p1", TimerKind::Finalize, 3, Duration::from_secs(60), |_| async {});
        let current = scheduler.arm("p1", TimerKind::Finalize, 4, Duration::from_secs(60), |_| async {});

        assert!(!scheduler.claim(&stale));
        assert!(scheduler.claim(&current));
    }

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let scheduler = Arc::new(TimerScheduler::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        arm_reporting(&scheduler, Duration::from_millis(10), tx);
        assert!(scheduler.cancel("p1"));
        assert!(!scheduler.cancel("p1"));

        sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
