pub mod ms {
    pub const CDP_ACTION: u64 = 3000;
    pub const POPUP_POLL: u64 = 200;
    /// Full-resolution assets can be tens of megabytes.
    pub const RESPONSE_WAIT: u64 = 120_000;
}

pub mod secs {
    pub const NAVIGATION: u64 = 30;
    pub const REQUEST: u64 = 120;
    pub const POPUP_OPEN: u64 = 30;
}
