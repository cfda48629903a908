//! Task runtime: operator lifecycle, channels and cancellation.
//!
//! Every operator owns an inbound channel, an outbound channel and a share
//! of the pipeline's one-shot cancellation signal. A task terminates for
//! one of three reasons: its upstream closed the input (normal drain), the
//! signal fired (cancellation), or it hit a fatal error (in which case it
//! closes the signal itself so the rest of the pipeline tears down).
//! Whatever the reason, the outbound channel is closed exactly once: `run`
//! takes the sender out of the base, so dropping it on any exit path seals
//! the channel.

use async_trait::async_trait;
use log::debug;
use tokio::sync::{mpsc, watch};

use crate::rowbridge::sql::error::{SqlError, SqlResult};

use super::config::PipelineConfig;
use super::message::Message;

/// One-shot broadcast cancellation signal shared by every task in a
/// pipeline. Closing is idempotent and observable by any number of
/// waiters.
#[derive(Debug, Clone)]
pub struct SigChan {
    tx: watch::Sender<bool>,
}

impl SigChan {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        SigChan { tx }
    }

    /// Fire the signal. Safe to call any number of times.
    pub fn close(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the signal has fired.
    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal fires; immediately if it already has.
    /// Cancel-safe, intended for `tokio::select!` arms.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for SigChan {
    fn default() -> Self {
        SigChan::new()
    }
}

/// What a map-style handler did with one message
pub enum Handled {
    /// Forward this message downstream
    Emit(Message),
    /// Drop the message, keep consuming
    Skip,
    /// Stop the task cleanly
    Stop,
}

/// Shared base every operator task embeds.
///
/// Construction allocates the task's outbound channel; the downstream task
/// (or the test harness) claims the receiving end with
/// [`TaskBase::take_output`] and feeds the task with [`TaskBase::set_input`].
#[derive(Debug)]
pub struct TaskBase {
    task_type: &'static str,
    msg_in: Option<mpsc::Receiver<Message>>,
    msg_out: Option<mpsc::Sender<Message>>,
    out_rx: Option<mpsc::Receiver<Message>>,
    sig: SigChan,
}

impl TaskBase {
    pub fn new(task_type: &'static str) -> Self {
        Self::with_config(task_type, &PipelineConfig::default())
    }

    pub fn with_config(task_type: &'static str, config: &PipelineConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_buffer_size);
        TaskBase {
            task_type,
            msg_in: None,
            msg_out: Some(tx),
            out_rx: Some(rx),
            sig: SigChan::new(),
        }
    }

    pub fn task_type(&self) -> &'static str {
        self.task_type
    }

    /// Wire this task's input to an upstream outbound channel.
    pub fn set_input(&mut self, rx: mpsc::Receiver<Message>) {
        self.msg_in = Some(rx);
    }

    /// Claim the receiving end of the outbound channel. Yields `None` the
    /// second time; each output has exactly one consumer.
    pub fn take_output(&mut self) -> Option<mpsc::Receiver<Message>> {
        self.out_rx.take()
    }

    /// This task's view of the shared cancellation signal.
    pub fn sig(&self) -> SigChan {
        self.sig.clone()
    }

    /// Replace the signal; the pipeline installs its shared one here.
    pub fn set_sig(&mut self, sig: SigChan) {
        self.sig = sig;
    }

    /// Request shutdown. Idempotent.
    pub fn close(&self) {
        self.sig.close();
    }

    pub(crate) fn take_input(&mut self) -> SqlResult<mpsc::Receiver<Message>> {
        self.msg_in
            .take()
            .ok_or_else(|| SqlError::stream_error(self.task_type, "input channel not wired"))
    }

    pub(crate) fn take_sender(&mut self) -> SqlResult<mpsc::Sender<Message>> {
        self.msg_out
            .take()
            .ok_or_else(|| SqlError::stream_error(self.task_type, "task already ran"))
    }

    /// Default run loop for map-style operators: read a message, apply the
    /// handler, forward its output with a signal-aware send. Terminates
    /// when the input drains, the handler says stop, or the signal fires.
    pub async fn run_handler<F>(&mut self, mut handler: F) -> SqlResult<()>
    where
        F: FnMut(Message) -> Handled + Send,
    {
        let out = self.take_sender()?;
        let mut input = self.take_input()?;
        let sig = self.sig.clone();
        let task_type = self.task_type;

        loop {
            tokio::select! {
                _ = sig.cancelled() => {
                    debug!("{}: got signal quit", task_type);
                    return Ok(());
                }
                msg = input.recv() => {
                    let Some(msg) = msg else {
                        // upstream closed, normal drain
                        return Ok(());
                    };
                    match handler(msg) {
                        Handled::Emit(out_msg) => {
                            tokio::select! {
                                _ = sig.cancelled() => {
                                    debug!("{}: got signal quit during send", task_type);
                                    return Ok(());
                                }
                                sent = out.send(out_msg) => {
                                    if sent.is_err() {
                                        debug!("{}: downstream closed", task_type);
                                        return Ok(());
                                    }
                                }
                            }
                        }
                        Handled::Skip => {}
                        Handled::Stop => return Ok(()),
                    }
                }
            }
        }
    }
}

/// An operator instance with its own thread of control
#[async_trait]
pub trait Task: Send {
    /// Stable operator name for diagnostics.
    fn task_type(&self) -> &'static str;

    /// This task's view of the shared cancellation signal.
    fn sig(&self) -> SigChan;

    /// Install the pipeline's shared signal before running.
    fn set_sig(&mut self, sig: SigChan);

    /// Drive the operator until its input drains, the signal fires, or a
    /// fatal error tears the pipeline down. Implementations must close
    /// their outbound channel on every exit path.
    async fn run(&mut self) -> SqlResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rowbridge::sql::execution::message::ContextSimple;
    use std::time::Duration;

    fn simple_msg(id: u64) -> Message {
        let mut ctx = ContextSimple::new();
        ctx.id = id;
        Message::Simple(ctx)
    }

    #[test]
    fn test_sigchan_close_is_idempotent() {
        let sig = SigChan::new();
        assert!(!sig.is_closed());
        sig.close();
        sig.close();
        assert!(sig.is_closed());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_close() {
        let sig = SigChan::new();
        let waiter = sig.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        sig.close();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancelled() must resolve promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_handler_drains_and_closes_output() {
        let (tx, rx) = mpsc::channel(8);
        let mut base = TaskBase::new("test");
        base.set_input(rx);
        let mut out = base.take_output().unwrap();

        tx.send(simple_msg(1)).await.unwrap();
        tx.send(simple_msg(2)).await.unwrap();
        drop(tx);

        base.run_handler(Handled::Emit).await.unwrap();

        assert_eq!(out.recv().await.map(|m| m.id()), Some(1));
        assert_eq!(out.recv().await.map(|m| m.id()), Some(2));
        // run exit closed the outbound channel
        assert!(out.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_run_handler_stops_on_signal() {
        let (_tx, rx) = mpsc::channel(8);
        let mut base = TaskBase::new("test");
        base.set_input(rx);
        let mut out = base.take_output().unwrap();
        let sig = base.sig();

        let handle = tokio::spawn(async move { base.run_handler(Handled::Emit).await });
        sig.close();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("run must return after signal")
            .unwrap()
            .unwrap();
        assert!(out.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_run_handler_skip_and_stop() {
        let (tx, rx) = mpsc::channel(8);
        let mut base = TaskBase::new("test");
        base.set_input(rx);
        let mut out = base.take_output().unwrap();

        tx.send(simple_msg(1)).await.unwrap();
        tx.send(simple_msg(2)).await.unwrap();
        tx.send(simple_msg(3)).await.unwrap();
        drop(tx);

        base.run_handler(|msg| {
            if msg.id() == 1 {
                Handled::Skip
            } else if msg.id() == 2 {
                Handled::Emit(msg)
            } else {
                Handled::Stop
            }
        })
        .await
        .unwrap();

        assert_eq!(out.recv().await.map(|m| m.id()), Some(2));
        assert!(out.recv().await.is_none());
    }
}
