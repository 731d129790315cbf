//! Status helper enums mapping to SMALLSERIAL/SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Queue item lifecycle status. Transitions are forward-only:
    /// queued -> processing -> completed | failed.
    QueueItemStatus {
        Queued = 1,
        Processing = 2,
        Completed = 3,
        Failed = 4,
    }
}

define_status_enum! {
    /// Generation record lifecycle status.
    GenerationStatus {
        Pending = 1,
        Generating = 2,
        Completed = 3,
        Failed = 4,
    }
}

impl QueueItemStatus {
    /// Look up a status by its database ID.
    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(Self::Queued),
            2 => Some(Self::Processing),
            3 => Some(Self::Completed),
            4 => Some(Self::Failed),
            _ => None,
        }
    }

    /// The seed-data name for this status.
    pub fn label(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_item_status_ids_match_seed_data() {
        assert_eq!(QueueItemStatus::Queued.id(), 1);
        assert_eq!(QueueItemStatus::Processing.id(), 2);
        assert_eq!(QueueItemStatus::Completed.id(), 3);
        assert_eq!(QueueItemStatus::Failed.id(), 4);
    }

    #[test]
    fn generation_status_ids_match_seed_data() {
        assert_eq!(GenerationStatus::Pending.id(), 1);
        assert_eq!(GenerationStatus::Generating.id(), 2);
        assert_eq!(GenerationStatus::Completed.id(), 3);
        assert_eq!(GenerationStatus::Failed.id(), 4);
    }

    #[test]
    fn from_id_round_trips() {
        for status in [
            QueueItemStatus::Queued,
            QueueItemStatus::Processing,
            QueueItemStatus::Completed,
            QueueItemStatus::Failed,
        ] {
            assert_eq!(QueueItemStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(QueueItemStatus::from_id(0), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!QueueItemStatus::Queued.is_terminal());
        assert!(!QueueItemStatus::Processing.is_terminal());
        assert!(QueueItemStatus::Completed.is_terminal());
        assert!(QueueItemStatus::Failed.is_terminal());
    }
}
