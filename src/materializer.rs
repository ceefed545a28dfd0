use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cadence::{compute_next_occurrence, validate_interval};
use crate::error::Result;
use crate::models::{RecurringDefinition, TransactionInstance};

/// Ten years of a daily cadence. A definition that needs more steps than
/// this in one pass keeps its partial progress and resumes on the next pass.
pub const DEFAULT_ITERATION_LIMIT: usize = 3660;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefinitionError {
    pub definition_id: i64,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct MaterializeResult {
    pub created_instances: Vec<TransactionInstance>,
    pub updated_definitions: Vec<RecurringDefinition>,
    pub generated_count: usize,
    pub errors: Vec<DefinitionError>,
    /// Definitions that hit the iteration limit before catching up to today.
    pub runaway: Vec<i64>,
}

struct DefinitionPass {
    definition: RecurringDefinition,
    created: Vec<TransactionInstance>,
    hit_limit: bool,
}

pub fn materialize_due_instances(
    definitions: &[RecurringDefinition],
    existing_instances: &[TransactionInstance],
    today: NaiveDate,
) -> MaterializeResult {
    materialize_with_limit(definitions, existing_instances, today, DEFAULT_ITERATION_LIMIT)
}

pub fn materialize_with_limit(
    definitions: &[RecurringDefinition],
    existing_instances: &[TransactionInstance],
    today: NaiveDate,
    iteration_limit: usize,
) -> MaterializeResult {
    // A zero ceiling would never let a due definition advance.
    let iteration_limit = iteration_limit.max(1);
    let mut seen: HashSet<(i64, NaiveDate)> = existing_instances
        .iter()
        .filter_map(|inst| inst.recurring_definition_id.map(|id| (id, inst.due_date)))
        .collect();

    let mut result = MaterializeResult::default();

    for def in definitions {
        match materialize_one(def, &seen, today, iteration_limit) {
            Ok(pass) => {
                for inst in &pass.created {
                    seen.insert((pass.definition.id, inst.due_date));
                }
                if pass.hit_limit {
                    warn!(
                        definition_id = def.id,
                        cursor = %pass.definition.next_due_date,
                        limit = iteration_limit,
                        "iteration limit reached, resuming on next pass"
                    );
                    result.runaway.push(def.id);
                }
                result.generated_count += pass.created.len();
                result.created_instances.extend(pass.created);
                result.updated_definitions.push(pass.definition);
            }
            Err(e) => {
                warn!(definition_id = def.id, error = %e, "skipping recurring definition");
                result.errors.push(DefinitionError {
                    definition_id: def.id,
                    reason: e.to_string(),
                });
            }
        }
    }

    debug!(
        %today,
        definitions = definitions.len(),
        generated = result.generated_count,
        errors = result.errors.len(),
        "materialization pass complete"
    );
    result
}

fn materialize_one(
    def: &RecurringDefinition,
    seen: &HashSet<(i64, NaiveDate)>,
    today: NaiveDate,
    iteration_limit: usize,
) -> Result<DefinitionPass> {
    validate_interval(def.interval)?;

    let mut updated = def.clone();
    if updated.next_due_date < updated.start_date {
        debug!(
            definition_id = def.id,
            from = %updated.next_due_date,
            to = %updated.start_date,
            "cursor behind start date, resetting"
        );
        updated.next_due_date = updated.start_date;
    }

    let mut created = Vec::new();
    let mut iterations = 0usize;
    let mut hit_limit = false;

    while is_due(&updated, today) {
        if iterations >= iteration_limit {
            hit_limit = true;
            break;
        }
        let due = updated.next_due_date;
        if !seen.contains(&(updated.id, due)) {
            created.push(TransactionInstance {
                id: None,
                payee_name: updated.payee_name.clone(),
                amount: updated.amount,
                transaction_type: updated.transaction_type,
                category_id: updated.category_id,
                due_date: due,
                is_paid: false,
                payment_date: None,
                recurring_definition_id: Some(updated.id),
            });
            updated.last_generated_date = Some(due);
        }
        updated.next_due_date = compute_next_occurrence(due, updated.frequency, updated.interval)?;
        iterations += 1;
    }

    Ok(DefinitionPass {
        definition: updated,
        created,
        hit_limit,
    })
}

fn is_due(def: &RecurringDefinition, today: NaiveDate) -> bool {
    def.next_due_date <= today && def.end_date.map_or(true, |end| def.next_due_date <= end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FrequencyUnit, TransactionType};

    fn d(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
    }

    fn monthly(id: i64, start: &str) -> RecurringDefinition {
        RecurringDefinition {
            id,
            payee_name: "Landlord".to_string(),
            amount: 1200.0,
            transaction_type: TransactionType::Expense,
            category_id: Some(7),
            frequency: FrequencyUnit::Month,
            interval: 1,
            start_date: d(start),
            end_date: None,
            next_due_date: d(start),
            last_generated_date: None,
        }
    }

    fn existing(def_id: i64, due: &str) -> TransactionInstance {
        TransactionInstance {
            id: Some(99),
            payee_name: "Landlord".to_string(),
            amount: 1200.0,
            transaction_type: TransactionType::Expense,
            category_id: Some(7),
            due_date: d(due),
            is_paid: true,
            payment_date: Some(d(due)),
            recurring_definition_id: Some(def_id),
        }
    }

    fn due_dates(result: &MaterializeResult) -> Vec<NaiveDate> {
        result.created_instances.iter().map(|i| i.due_date).collect()
    }

    #[test]
    fn test_three_months_catch_up() {
        let defs = vec![monthly(1, "2024-01-01")];
        let result = materialize_due_instances(&defs, &[], d("2024-03-15"));
        assert_eq!(result.generated_count, 3);
        assert_eq!(due_dates(&result), vec![d("2024-01-01"), d("2024-02-01"), d("2024-03-01")]);
        let updated = &result.updated_definitions[0];
        assert_eq!(updated.next_due_date, d("2024-04-01"));
        assert_eq!(updated.last_generated_date, Some(d("2024-03-01")));
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_instances_copy_definition_fields() {
        let mut def = monthly(1, "2024-01-01");
        def.transaction_type = TransactionType::Income;
        def.payee_name = "Employer".to_string();
        def.amount = 5000.5;
        let result = materialize_due_instances(&[def], &[], d("2024-01-01"));
        let inst = &result.created_instances[0];
        assert_eq!(inst.payee_name, "Employer");
        assert_eq!(inst.amount, 5000.5);
        assert_eq!(inst.transaction_type, TransactionType::Income);
        assert_eq!(inst.category_id, Some(7));
        assert_eq!(inst.recurring_definition_id, Some(1));
        assert!(!inst.is_paid);
        assert!(inst.id.is_none());
    }

    #[test]
    fn test_gap_with_existing_instance() {
        let defs = vec![monthly(1, "2024-01-01")];
        let result = materialize_due_instances(&defs, &[existing(1, "2024-02-01")], d("2024-03-15"));
        assert_eq!(result.generated_count, 2);
        assert_eq!(due_dates(&result), vec![d("2024-01-01"), d("2024-03-01")]);
        assert_eq!(result.updated_definitions[0].next_due_date, d("2024-04-01"));
    }

    #[test]
    fn test_existing_instance_of_other_definition_does_not_block() {
        let defs = vec![monthly(1, "2024-01-01")];
        let mut manual = existing(2, "2024-01-01");
        let result = materialize_due_instances(&defs, &[manual.clone()], d("2024-01-31"));
        assert_eq!(result.generated_count, 1);
        manual.recurring_definition_id = None;
        let result = materialize_due_instances(&defs, &[manual], d("2024-01-31"));
        assert_eq!(result.generated_count, 1);
    }

    #[test]
    fn test_second_pass_is_idempotent() {
        let defs = vec![monthly(1, "2024-01-01"), monthly(2, "2024-02-10")];
        let today = d("2024-03-15");
        let first = materialize_due_instances(&defs, &[], today);
        assert_eq!(first.generated_count, 5);

        let second = materialize_due_instances(&first.updated_definitions, &first.created_instances, today);
        assert_eq!(second.generated_count, 0);
        assert!(second.created_instances.is_empty());
        assert_eq!(second.updated_definitions, first.updated_definitions);
    }

    #[test]
    fn test_stale_cursor_with_existing_instances_is_idempotent() {
        // Cursor was never saved, but the instances were.
        let defs = vec![monthly(1, "2024-01-01")];
        let today = d("2024-03-15");
        let first = materialize_due_instances(&defs, &[], today);
        let second = materialize_due_instances(&defs, &first.created_instances, today);
        assert_eq!(second.generated_count, 0);
        assert_eq!(second.updated_definitions[0].next_due_date, d("2024-04-01"));
        assert_eq!(second.updated_definitions[0].last_generated_date, None);
    }

    #[test]
    fn test_cursor_always_past_today_or_end() {
        let mut weekly = monthly(1, "2023-06-03");
        weekly.frequency = FrequencyUnit::Week;
        weekly.interval = 2;
        let mut ended = monthly(2, "2023-01-31");
        ended.end_date = Some(d("2023-05-15"));
        let mut yearly = monthly(3, "2020-02-29");
        yearly.frequency = FrequencyUnit::Year;

        let today = d("2024-03-15");
        let result = materialize_due_instances(&[weekly, ended, yearly], &[], today);
        for def in &result.updated_definitions {
            let past_end = def.end_date.is_some_and(|end| def.next_due_date > end);
            assert!(def.next_due_date > today || past_end, "cursor stalled for {}", def.id);
        }
        assert!(result.runaway.is_empty());
    }

    #[test]
    fn test_end_date_equal_to_today_is_inclusive() {
        let mut def = monthly(1, "2024-01-15");
        def.end_date = Some(d("2024-03-15"));
        let result = materialize_due_instances(&[def], &[], d("2024-03-15"));
        assert_eq!(due_dates(&result), vec![d("2024-01-15"), d("2024-02-15"), d("2024-03-15")]);
        assert_eq!(result.updated_definitions[0].next_due_date, d("2024-04-15"));
    }

    #[test]
    fn test_end_date_before_today_generates_nothing_further() {
        let mut def = monthly(1, "2024-01-15");
        def.end_date = Some(d("2024-03-14"));
        def.next_due_date = d("2024-03-15");
        def.last_generated_date = Some(d("2024-02-15"));
        let result = materialize_due_instances(&[def], &[], d("2024-03-15"));
        assert_eq!(result.generated_count, 0);
        assert_eq!(result.updated_definitions[0].next_due_date, d("2024-03-15"));
        assert_eq!(result.updated_definitions[0].last_generated_date, Some(d("2024-02-15")));
    }

    #[test]
    fn test_cursor_behind_start_date_is_corrected() {
        let mut def = monthly(1, "2024-03-01");
        def.next_due_date = d("2024-01-01");
        let result = materialize_due_instances(&[def], &[], d("2024-03-15"));
        assert_eq!(due_dates(&result), vec![d("2024-03-01")]);
        assert_eq!(result.updated_definitions[0].next_due_date, d("2024-04-01"));
    }

    #[test]
    fn test_corrected_cursor_saved_even_when_nothing_due() {
        let mut def = monthly(1, "2024-06-01");
        def.next_due_date = d("2024-01-01");
        let result = materialize_due_instances(&[def], &[], d("2024-03-15"));
        assert_eq!(result.generated_count, 0);
        assert_eq!(result.updated_definitions.len(), 1);
        assert_eq!(result.updated_definitions[0].next_due_date, d("2024-06-01"));
    }

    #[test]
    fn test_future_definition_untouched() {
        let def = monthly(1, "2024-05-01");
        let result = materialize_due_instances(&[def.clone()], &[], d("2024-03-15"));
        assert_eq!(result.generated_count, 0);
        assert_eq!(result.updated_definitions, vec![def]);
    }

    #[test]
    fn test_invalid_cadence_is_isolated() {
        let mut bad = monthly(1, "2024-01-01");
        bad.interval = 0;
        let good = monthly(2, "2024-01-01");
        let result = materialize_due_instances(&[bad, good], &[], d("2024-02-15"));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].definition_id, 1);
        assert!(result.errors[0].reason.contains("interval"));
        assert_eq!(result.generated_count, 2);
        assert_eq!(result.updated_definitions.len(), 1);
        assert_eq!(result.updated_definitions[0].id, 2);
        assert!(result.created_instances.iter().all(|i| i.recurring_definition_id == Some(2)));
    }

    #[test]
    fn test_overflow_discards_partial_output() {
        let mut def = monthly(1, "2024-01-01");
        def.frequency = FrequencyUnit::Year;
        def.start_date = NaiveDate::MAX;
        def.next_due_date = NaiveDate::MAX;
        let result = materialize_due_instances(&[def], &[], NaiveDate::MAX);
        assert_eq!(result.generated_count, 0);
        assert!(result.created_instances.is_empty());
        assert!(result.updated_definitions.is_empty());
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_iteration_limit_keeps_partial_progress() {
        let mut def = monthly(1, "2024-01-01");
        def.frequency = FrequencyUnit::Day;
        let today = d("2024-01-10");
        let first = materialize_with_limit(&[def], &[], today, 4);
        assert_eq!(first.generated_count, 4);
        assert_eq!(first.runaway, vec![1]);
        assert_eq!(first.updated_definitions[0].next_due_date, d("2024-01-05"));
        assert_eq!(first.updated_definitions[0].last_generated_date, Some(d("2024-01-04")));

        let second = materialize_with_limit(&first.updated_definitions, &first.created_instances, today, 4);
        assert_eq!(due_dates(&second), vec![d("2024-01-05"), d("2024-01-06"), d("2024-01-07"), d("2024-01-08")]);
        assert_eq!(second.runaway, vec![1]);

        let third = materialize_with_limit(&second.updated_definitions, &second.created_instances, today, 4);
        assert_eq!(third.generated_count, 2);
        assert!(third.runaway.is_empty());
        assert_eq!(third.updated_definitions[0].next_due_date, d("2024-01-11"));
    }

    #[test]
    fn test_exact_limit_is_not_runaway() {
        let mut def = monthly(1, "2024-01-01");
        def.frequency = FrequencyUnit::Day;
        let result = materialize_with_limit(&[def], &[], d("2024-01-03"), 3);
        assert_eq!(result.generated_count, 3);
        assert!(result.runaway.is_empty());
    }

    #[test]
    fn test_zero_limit_still_advances_one_step() {
        let def = monthly(1, "2024-01-01");
        let today = d("2024-03-15");
        let first = materialize_with_limit(&[def], &[], today, 0);
        assert_eq!(due_dates(&first), vec![d("2024-01-01")]);
        assert_eq!(first.runaway, vec![1]);
        assert_eq!(first.updated_definitions[0].next_due_date, d("2024-02-01"));

        let second = materialize_with_limit(&first.updated_definitions, &first.created_instances, today, 0);
        assert_eq!(due_dates(&second), vec![d("2024-02-01")]);
        assert_eq!(second.updated_definitions[0].next_due_date, d("2024-03-01"));
    }

    #[test]
    fn test_duplicate_definition_rows_do_not_duplicate_instances() {
        let def = monthly(1, "2024-01-01");
        let result = materialize_due_instances(&[def.clone(), def], &[], d("2024-02-15"));
        assert_eq!(result.generated_count, 2);
    }
}
