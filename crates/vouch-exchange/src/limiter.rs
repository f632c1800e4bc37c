//! Per-account sliding-bucket rate limiter.
//!
//! Deliberately race-tolerant: counters are read and written outside any
//! transaction, so concurrent requests can both slip through slightly over
//! budget. Enforcement is approximate with bounded overshoot, and that is
//! the contract.

use vouch_core::{Code, Outcome};
use vouch_registry::LimiterKind;
use vouch_store::{Collection, DocStore, require_fresh};

use crate::docs::{SlotDoc, SlotEntry, from_doc, to_doc};
use crate::{Exchange, store_outcome};

impl<S: DocStore + 'static> Exchange<S> {
    /// Admit or reject a request of `volume` bytes against every limiter
    /// of the account's plan, and charge the counters either way.
    ///
    /// A rejected attempt still consumes budget - the counters are
    /// persisted regardless of the verdict, best-effort and without
    /// blocking the caller.
    #[must_use]
    #[allow(clippy::arithmetic_side_effects, clippy::cast_possible_wrap)]
    pub fn check_and_charge(
        &self,
        plan_id: &str,
        account_id: &str,
        volume: usize,
    ) -> Outcome<()> {
        let Some(plan) = self.registry().plan(plan_id) else {
            return Outcome::fail(Code::Internal, format!("plan {plan_id} unknown"));
        };
        if account_id.is_empty() {
            return Outcome::fail(Code::Internal, "accountId missing");
        }

        let now = self.now_millis();
        let fetched = store_outcome(self.store().get(Collection::SlotLimits, account_id));
        if !fetched.is_ok() {
            return fetched.recast();
        }
        // an absent or expired counter document just means a fresh start
        let current = require_fresh(
            Collection::SlotLimits,
            account_id,
            fetched.into_value().flatten(),
            now,
        )
        .into_value()
        .map_or_else(SlotDoc::default, |v| {
            from_doc::<SlotDoc>(v).into_value().unwrap_or_default()
        });

        let mut out = Outcome::good(());
        let mut entries = std::collections::BTreeMap::new();
        for (name, limiter) in &plan.limiters {
            // the measurement slot this request lands in
            let slot = now.div_euclid(limiter.seconds.max(1) * 1000);
            let mut entry = current
                .entries
                .get(name)
                .copied()
                .filter(|e| e.slot == slot)
                .unwrap_or(SlotEntry { slot, used: 0 });
            entry.used += match limiter.kind {
                LimiterKind::Quota => volume as i64,
                LimiterKind::Count => 1,
            };
            out = out.ensure(
                entry.used <= limiter.rate,
                Code::Quota,
                format!("{name} quota/rate limit exceeded"),
            );
            entries.insert(name.clone(), entry);
        }

        let doc = SlotDoc {
            entries,
            expires: now.saturating_add(self.registry().settings().slot_limit_lifetime_ms),
        };
        if let Some(value) = to_doc(&doc).into_value() {
            self.best_effort_set(Collection::SlotLimits, account_id.to_owned(), value);
        }
        out
    }
}
