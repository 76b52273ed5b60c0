use state_machines::state_machine;

state_machine! {
    name: IngestionMachine,
    state: IngestionState,
    initial: Ready,
    states: [Ready, Validated, Chunked, Persisted, Failed],
    events {
        validate { transition: { from: Ready, to: Validated } }
        chunk { transition: { from: Validated, to: Chunked } }
        persist { transition: { from: Chunked, to: Persisted } }
        abort {
            transition: { from: Ready, to: Failed }
            transition: { from: Validated, to: Failed }
            transition: { from: Chunked, to: Failed }
        }
    }
}

pub fn ready() -> IngestionMachine<(), Ready> {
    IngestionMachine::new(())
}
