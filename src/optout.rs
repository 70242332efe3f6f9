//! Opt-out keyword classification and subscription state.
//!
//! Customers manage their subscription by texting fixed keywords. The CRM
//! stores the resulting state as free text in a single column, so both
//! directions of that raw encoding live here and nowhere else.

/// Keywords that re-subscribe a customer (compared uppercase, exact match).
pub const OPT_IN_KEYWORDS: [&str; 2] = ["START", "STAHT"];

/// Keywords that unsubscribe a customer (compared uppercase, exact match).
pub const OPT_OUT_KEYWORDS: [&str; 3] = ["STOP", "STAHP", "IQUIT"];

/// Classifier verdict for a single message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptSignal {
    OptIn,
    OptOut,
    None,
}

/// Classify a message body as an opt-in or opt-out request.
///
/// The whole body must equal a keyword after uppercasing; "STOPPING" and
/// "please stop" carry no signal. Absent and empty bodies carry none either.
pub fn classify(body: Option<&str>) -> OptSignal {
    let Some(body) = body.filter(|b| !b.is_empty()) else {
        return OptSignal::None;
    };
    let upper = body.to_uppercase();
    if OPT_IN_KEYWORDS.contains(&upper.as_str()) {
        OptSignal::OptIn
    } else if OPT_OUT_KEYWORDS.contains(&upper.as_str()) {
        OptSignal::OptOut
    } else {
        OptSignal::None
    }
}

/// A customer's subscription state as tracked in the CRM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OptOutStatus {
    /// The customer never expressed a preference.
    #[default]
    NotSet,
    Subscribed,
    OptedOut,
}

impl OptOutStatus {
    /// Parse the CRM's raw free-text encoding. Total: anything that is not
    /// an explicit true/false reads as `NotSet`.
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw {
            Some(v) if v.eq_ignore_ascii_case("true") => Self::OptedOut,
            Some(v) if v.eq_ignore_ascii_case("false") => Self::Subscribed,
            _ => Self::NotSet,
        }
    }

    /// Raw value written back to the CRM; `NotSet` clears the column.
    pub fn as_raw(self) -> Option<&'static str> {
        match self {
            Self::OptedOut => Some("true"),
            Self::Subscribed => Some("false"),
            Self::NotSet => None,
        }
    }

    /// Human-readable label used in the customer details block.
    pub fn label(self) -> &'static str {
        match self {
            Self::OptedOut => "OPTED OUT",
            Self::Subscribed => "SUBSCRIBED",
            Self::NotSet => "NOT SET",
        }
    }

    /// Advance the state with a classifier verdict.
    ///
    /// Opt-in always lands on `Subscribed` and opt-out on `OptedOut`, from
    /// any starting state; a `None` signal leaves the state unchanged.
    pub fn apply(self, signal: OptSignal) -> Self {
        match signal {
            OptSignal::OptIn => Self::Subscribed,
            OptSignal::OptOut => Self::OptedOut,
            OptSignal::None => self,
        }
    }

    /// True when messages must not be relayed to this customer.
    pub fn is_opted_out(self) -> bool {
        matches!(self, Self::OptedOut)
    }
}
