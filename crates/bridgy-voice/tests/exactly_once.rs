//! Racing finality signals against one recognition session.

use bridgy_voice::{
    AudioJob, AudioResourceArbiter, DeviceCall, EngineFailure, FixedAuthorization,
    PlaceholderAudioDevice, PlaceholderRecognizer, RecognitionContext, RecognitionEvent,
    RecognitionState, SpeechRecognitionSession, VoiceError,
};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Stop,
    Final,
    Error,
    EngineCancelled,
    Preempt,
}

const SIGNALS: [Signal; 5] = [
    Signal::Stop,
    Signal::Final,
    Signal::Error,
    Signal::EngineCancelled,
    Signal::Preempt,
];

fn permutations(items: &[Signal]) -> Vec<Vec<Signal>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head);
            out.push(tail);
        }
    }
    out
}

/// What a session holding `heard` resolves to when `signal` arrives first.
fn expected(signal: Signal, heard: &str) -> Result<String, VoiceError> {
    match signal {
        Signal::Final => Ok("final answer".to_string()),
        Signal::Error => Err(VoiceError::EngineError("engine down".to_string())),
        Signal::Stop | Signal::EngineCancelled | Signal::Preempt => {
            if heard.is_empty() {
                Err(VoiceError::Cancelled)
            } else {
                Ok(heard.to_string())
            }
        }
    }
}

fn fire(session: &SpeechRecognitionSession, signal: Signal) {
    match signal {
        Signal::Stop => {
            session.stop();
        }
        Signal::Final => session.apply(RecognitionEvent::Final("final answer".to_string())),
        Signal::Error => session.apply(RecognitionEvent::Error(EngineFailure::Other(
            "engine down".to_string(),
        ))),
        Signal::EngineCancelled => {
            session.apply(RecognitionEvent::Error(EngineFailure::Cancelled))
        }
        Signal::Preempt => session.preempt(),
    }
}

struct Rig {
    ctx: RecognitionContext,
    device: Arc<PlaceholderAudioDevice>,
    recognizer: Arc<PlaceholderRecognizer>,
}

fn rig() -> Rig {
    let device = Arc::new(PlaceholderAudioDevice::new());
    let recognizer = Arc::new(PlaceholderRecognizer::new());
    let (listening, _) = watch::channel(false);
    Rig {
        ctx: RecognitionContext {
            arbiter: Arc::new(AudioResourceArbiter::new()),
            device: device.clone(),
            recognizer: recognizer.clone(),
            authorization: Arc::new(FixedAuthorization::granted()),
            listening: Arc::new(listening),
        },
        device,
        recognizer,
    }
}

#[tokio::test]
async fn every_signal_order_resolves_once() {
    for heard in ["", "hello world"] {
        for order in permutations(&SIGNALS) {
            let rig = rig();
            let (session, mut outcome) =
                SpeechRecognitionSession::start(rig.ctx.clone(), &Handle::current());
            if !heard.is_empty() {
                session.apply(RecognitionEvent::Partial(heard.to_string()));
            }

            for &signal in &order {
                fire(&session, signal);
            }

            assert_eq!(
                outcome.try_take(),
                Some(expected(order[0], heard)),
                "order {:?} with {:?}",
                order,
                heard
            );
            assert_eq!(session.state(), RecognitionState::Done);
            assert_eq!(rig.device.count(&DeviceCall::Deactivate), 1, "order {:?}", order);
            assert_eq!(rig.device.count(&DeviceCall::RemoveTap), 1);
            assert_eq!(rig.recognizer.cancel_count(), 1);
            assert_eq!(rig.ctx.arbiter.holder(), None);
        }
    }
}

#[test]
fn concurrent_signals_resolve_once() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("runtime");

    for _ in 0..50 {
        let rig = rig();
        let (session, mut outcome) =
            SpeechRecognitionSession::start(rig.ctx.clone(), runtime.handle());
        session.apply(RecognitionEvent::Partial("hello world".to_string()));

        std::thread::scope(|scope| {
            for signal in SIGNALS {
                let session = &session;
                scope.spawn(move || fire(session, signal));
            }
        });

        let result = outcome.try_take().expect("resolved after all signals");
        let allowed: Vec<_> = SIGNALS
            .iter()
            .map(|&s| expected(s, "hello world"))
            .collect();
        assert!(allowed.contains(&result), "unexpected {:?}", result);
        assert_eq!(rig.device.count(&DeviceCall::Deactivate), 1);
        assert_eq!(rig.recognizer.cancel_count(), 1);
    }
}
