use std::sync::Arc;

use log::info;
use optocompiler_backend::*;
use optoexpctrl_backend::*;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut points = StimulusPoints::new();
    for i in 0..5 {
        points.add_point([15.0 * i as f64, 30.0], 0);
    }

    let mut seq = ProtocolSequence::new(Pattern::Random, 7);
    seq.push(ProtocolElement::new(
        vec![
            SelectedStimulusPoint::normal(0),
            SelectedStimulusPoint::new(2, Pattern::Random),
        ],
        true,
        false,
        true,
        false,
        0.05,
    )?);
    seq.push(ProtocolElement::timed(vec![SelectedStimulusPoint::new(4, Pattern::Random)], 0.05)?);
    seq.push(ProtocolElement::waiting(vec![])?);

    let config = ExecutorConfig {
        inter_loop_delay: 0.02,
        wait_poll_interval: 0.01,
        ..Default::default()
    };
    let display = Arc::new(RecordingDisplay::new());
    let mut executor = SequenceExecutor::new(SimulatedLabJack::new(), display.clone(), config)?;
    let events = executor.subscribe();

    executor.start_sequence(&seq, &points, 3)?;
    let outcome = executor.join();
    for event in events.try_iter() {
        info!("{:?}", event);
    }
    info!("outcome: {:?}", outcome);
    info!("display frames: {:?}", display.frames());
    info!(
        "device batches: {}",
        executor.device().lock().executed().len()
    );
    Ok(())
}
