//! Method and field names of the voting backend interface.

/// The bootstrap object.
pub mod backend {
    pub const INCREMENT: &str = "increment";
    pub const GET_CONTEST_GENERATOR: &str = "getContestGenerator";
    pub const SEARCH_CONTESTS: &str = "searchContests";
    pub const GET_CONTEST_CREATOR: &str = "getContestCreator";

    pub const RESULT: &str = "result";
    pub const GENERATOR: &str = "generator";
    pub const CREATOR: &str = "creator";
}

/// Search filters passed to `searchContests`.
pub mod filter {
    pub const TYPE: &str = "type";
    pub const ARGUMENTS: &str = "arguments";
}

pub mod generator {
    pub const NEXT: &str = "next";
    pub const NEXT_COUNT: &str = "nextCount";

    pub const NEXT_CONTEST: &str = "nextContest";
    pub const NEXT_CONTESTS: &str = "nextContests";
}

/// A contest as listed by a generator.
pub mod listed_contest {
    pub const CONTEST_ID: &str = "contestId";
    pub const VOTING_STAKE: &str = "votingStake";
    pub const TRACKS_LIVE_RESULTS: &str = "tracksLiveResults";
}

pub mod creator {
    pub const GET_PRICE_SCHEDULE: &str = "getPriceSchedule";
    pub const GET_CONTEST_LIMITS: &str = "getContestLimits";
    pub const PURCHASE_CONTEST: &str = "purchaseContest";

    pub const PRICES: &str = "prices";
    pub const LIMITS: &str = "limits";
    pub const CONTEST_ID: &str = "contestId";
}

/// The contest description sent with `purchaseContest`.
pub mod contest {
    pub const NAME: &str = "name";
    pub const DESCRIPTION: &str = "description";
    pub const CONTESTANTS: &str = "contestants";
    pub const EXPIRATION: &str = "expiration";
}
