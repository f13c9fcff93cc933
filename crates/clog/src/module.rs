/// Which subsystem produced a log entry, so a single log stream can be
/// replayed by dispatching each entry to its owning component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum LogModule {
    BufferPool,
    RecordManager,
    BplusTree,
    Transaction,
}

impl LogModule {
    pub fn id(self) -> u8 {
        match self {
            LogModule::BufferPool => 0,
            LogModule::RecordManager => 1,
            LogModule::BplusTree => 2,
            LogModule::Transaction => 3,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(LogModule::BufferPool),
            1 => Some(LogModule::RecordManager),
            2 => Some(LogModule::BplusTree),
            3 => Some(LogModule::Transaction),
            _ => None,
        }
    }
}
