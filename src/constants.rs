pub mod cache {

    /// Merged search responses are memoized for a fixed five minutes.
    pub const RESULT_TTL_MINUTES: i64 = 5;
}

pub mod rate_limit {

    /// Quota windows are fixed-length, anchored at first use after each reset.
    pub const WINDOW_MINUTES: i64 = 60;
}

pub mod retention {

    /// Ledger rows outlive the longest window so a window count never comes
    /// up short.
    pub const REQUEST_HOURS: i64 = 2;

    /// Idle windows are swept after a day. Expired windows are reset before
    /// they are read for a decision, so this is storage hygiene only.
    pub const WINDOW_HOURS: i64 = 24;
}
