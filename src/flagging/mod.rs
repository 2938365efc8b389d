// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! View-based flagging.
//!
//! A view task computes [`ImageView`]s from the current state of the data,
//! [`FlagRule`]s decide which cells of those views are bad, and a
//! [`FlagSetter`] applies the resulting [`FlagCommand`]s to the data. The
//! [`IterativeViewFlagger`] repeats this until the rules are satisfied.

mod error;
mod flagcmd;
mod memory;
mod rules;
mod setter;
mod view;
mod viewflagger;

pub use error::ViewError;
pub use flagcmd::{AxisSelection, FlagCommand};
pub use memory::{StoredViews, ViewStore, ViewStoreRunner};
pub use rules::{make_flag_rules, FlagRule, FlagRuleParams, RuleAxis};
pub use setter::{FlagSetter, FlagdataSetter, FlagdataSetterResults};
pub use view::{ImageView, ResultAxis, ViewResults};
pub use viewflagger::{
    CancelToken, FlaggedView, IterativeViewFlagger, StopReason, ViewFlaggerResults,
};
