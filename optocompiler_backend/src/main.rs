use optocompiler_backend::*;

fn main() -> Result<()> {
    let mut points = StimulusPoints::new();
    for i in 0..6 {
        points.add_point([20.0 * i as f64, 0.0], 0);
    }

    let mut seq = ProtocolSequence::new(Pattern::IncrementByOne, 42);
    seq.push(ProtocolElement::new(
        vec![
            SelectedStimulusPoint::normal(0),
            SelectedStimulusPoint::new(1, Pattern::IncrementByOne),
        ],
        true,
        true,
        false,
        false,
        0.5,
    )?);
    seq.push(ProtocolElement::waiting(vec![SelectedStimulusPoint::new(3, Pattern::IncrementByOne)])?);

    let program = Program::generate(&seq, &points, 4)?;
    for (loop_index, elements) in program.loops().iter().enumerate() {
        for (iteration, element) in elements.iter().enumerate() {
            println!("loop {} element {}: {:?}", loop_index, iteration, element.point_indices());
        }
    }

    let states: Vec<LabJackState> = program
        .initial_sequence()
        .iter()
        .map(|element| LabJackState::from_element(element, &LineMapping::default()))
        .collect();
    let batches = compile_command_batches(&states, |volts, _| Ok::<u8, Error>((volts * 51.0) as u8))?;
    for batch in batches {
        println!("{:?}", batch.iter().map(|c| c.to_string()).collect::<Vec<String>>());
    }

    println!("{}", seq.to_json()?);
    Ok(())
}
