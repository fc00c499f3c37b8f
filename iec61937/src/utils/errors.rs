#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("Input of {fed} bytes would overflow the work buffer ({used} of {capacity} bytes in use)")]
    WorkBufferFull {
        fed: usize,
        used: usize,
        capacity: usize,
    },

    #[error("Output buffer too small: next access unit needs {needed} bytes, got {provided}")]
    OutputBufferTooSmall { needed: usize, provided: usize },

    #[error(
        "Pending access unit cannot be completed: burst carries {available} payload bytes but only {missing} are missing"
    )]
    PendingDataOverrun { missing: usize, available: usize },

    #[error(
        "Pending access unit cannot be completed: first payload offset {data_offset} lies inside the {missing} missing bytes"
    )]
    PendingDataOffset { data_offset: usize, missing: usize },

    #[error("Pending access unit would exceed the maximum MPEG-H frame size of {max} bytes")]
    PendingDataTooLarge { max: usize },
}

impl DecodeError {
    /// True for the reassembly violations that force a full state reset.
    pub fn is_pending_data(&self) -> bool {
        matches!(
            self,
            DecodeError::PendingDataOverrun { .. }
                | DecodeError::PendingDataOffset { .. }
                | DecodeError::PendingDataTooLarge { .. }
        )
    }
}

#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error("Unsupported sample-rate factor {0}; IEC 61937-13 allows 4 or 16")]
    UnsupportedRateFactor(u32),

    #[error("Access-unit duration of {duration} samples exceeds the maximum of {max}")]
    DurationTooLong { duration: u32, max: u32 },

    #[error("Output buffer of {provided} bytes cannot hold one {needed}-byte burst")]
    OutputBufferTooSmall { needed: usize, provided: usize },

    #[error("Access-unit queue is full")]
    QueueFull,

    #[error("Access unit of {len} bytes would overflow the work buffer ({free} bytes free)")]
    WorkBufferFull { len: usize, free: usize },
}
