use clap::ValueEnum;
use taxonav_funnel::{L1MatchPolicy, UnparseableFinalPolicy};

#[derive(Copy, Clone, ValueEnum)]
pub(crate) enum L1MatchFlag {
    Exact,
    Containment,
}

impl L1MatchFlag {
    pub(crate) const fn as_domain(self) -> L1MatchPolicy {
        match self {
            L1MatchFlag::Exact => L1MatchPolicy::Exact,
            L1MatchFlag::Containment => L1MatchPolicy::Containment,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
pub(crate) enum UnparseableFinalFlag {
    FirstCandidate,
    Fail,
}

impl UnparseableFinalFlag {
    pub(crate) const fn as_domain(self) -> UnparseableFinalPolicy {
        match self {
            UnparseableFinalFlag::FirstCandidate => UnparseableFinalPolicy::FirstCandidate,
            UnparseableFinalFlag::Fail => UnparseableFinalPolicy::Fail,
        }
    }
}
