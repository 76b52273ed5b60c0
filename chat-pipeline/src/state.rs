use state_machines::state_machine;

state_machine! {
    name: ChatMachine,
    state: ChatState,
    initial: Received,
    states: [Received, Retrieving, Generating, Streaming, Completed, Errored],
    events {
        accept { transition: { from: Received, to: Retrieving } }
        generate { transition: { from: Retrieving, to: Generating } }
        stream { transition: { from: Generating, to: Streaming } }
        complete { transition: { from: Streaming, to: Completed } }
        fail {
            transition: { from: Received, to: Errored }
            transition: { from: Retrieving, to: Errored }
            transition: { from: Generating, to: Errored }
            transition: { from: Streaming, to: Errored }
        }
    }
}

pub fn received() -> ChatMachine<(), Received> {
    ChatMachine::new(())
}
