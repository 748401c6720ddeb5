use tracing::debug;

use crate::models::{PracticeError, PracticeSnapshot, SavedOperatory, SavedProvider};

/// Operatory narrowing for the availability query. `Unfiltered` means the
/// query spans every operatory of the eligible providers (the parameter is
/// omitted); `Narrowed` carries an explicit candidate set, which can be empty
/// when a caller-supplied filter intersected everything away. The two empty
/// cases are deliberately distinct values.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorySelection {
    Unfiltered,
    Narrowed(Vec<SavedOperatory>),
}

impl OperatorySelection {
    pub fn nexhealth_ids(&self) -> Vec<i64> {
        match self {
            OperatorySelection::Unfiltered => vec![],
            OperatorySelection::Narrowed(operatories) => operatories
                .iter()
                .map(|op| op.nexhealth_operatory_id)
                .collect(),
        }
    }

    pub fn operatories(&self) -> &[SavedOperatory] {
        match self {
            OperatorySelection::Unfiltered => &[],
            OperatorySelection::Narrowed(operatories) => operatories,
        }
    }
}

/// Providers and operatories eligible for one appointment type, ready for
/// both the availability query (external ids) and the booking write (full
/// objects, first-eligible tie-break).
#[derive(Debug, Clone, PartialEq)]
pub struct EligibilityResolution {
    /// Eligible providers, ascending by internal id. The ordering is the
    /// write-time tie-break: "first eligible" means first in this sort.
    pub providers: Vec<SavedProvider>,
    pub operatory_selection: OperatorySelection,
}

impl EligibilityResolution {
    pub fn provider_nexhealth_ids(&self) -> Vec<i64> {
        self.providers
            .iter()
            .map(|p| p.nexhealth_provider_id)
            .collect()
    }

    /// First-eligible selection policy for write operations. Deterministic by
    /// the stable id sort; round-robin or load-based selection is a later
    /// evolution, not this one.
    pub fn first_provider(&self) -> Option<&SavedProvider> {
        self.providers.first()
    }

    pub fn first_operatory(&self) -> Option<&SavedOperatory> {
        self.operatory_selection.operatories().first()
    }
}

/// Compute which providers can see the patient for this appointment type and
/// which operatories the availability query should span.
pub fn resolve_eligibility(
    practice: &PracticeSnapshot,
    appointment_type_id: i64,
    appointment_type_name: &str,
    provider_filter: Option<&[i64]>,
    operatory_filter: Option<&[i64]>,
) -> Result<EligibilityResolution, PracticeError> {
    if practice.providers.is_empty() {
        return Err(PracticeError::NoSavedProviders);
    }

    let active: Vec<&SavedProvider> = practice.providers.iter().filter(|p| p.is_active).collect();
    if active.is_empty() {
        return Err(PracticeError::NoActiveProviders);
    }

    let mut eligible: Vec<SavedProvider> = active
        .into_iter()
        .filter(|p| p.accepts_type(appointment_type_id))
        .cloned()
        .collect();

    if let Some(filter) = provider_filter {
        eligible.retain(|p| filter.contains(&p.id));
    }

    if eligible.is_empty() {
        return Err(PracticeError::NoProvidersForType {
            type_name: appointment_type_name.to_string(),
        });
    }

    eligible.sort_by_key(|p| p.id);

    // Union of active operatories assigned to the eligible providers,
    // deduplicated by id.
    let mut candidate_operatories: Vec<SavedOperatory> = Vec::new();
    for provider in &eligible {
        for operatory_id in &provider.assigned_operatory_ids {
            if candidate_operatories.iter().any(|op| op.id == *operatory_id) {
                continue;
            }
            if let Some(operatory) = practice
                .operatories
                .iter()
                .find(|op| op.id == *operatory_id && op.is_active)
            {
                candidate_operatories.push(operatory.clone());
            }
        }
    }
    candidate_operatories.sort_by_key(|op| op.id);

    let operatory_selection = match operatory_filter {
        Some(filter) => {
            let narrowed: Vec<SavedOperatory> = candidate_operatories
                .into_iter()
                .filter(|op| filter.contains(&op.id))
                .collect();
            if narrowed.is_empty() {
                debug!(
                    "Caller operatory filter eliminated every candidate for type {}; \
                     querying without operatory narrowing",
                    appointment_type_id
                );
            }
            OperatorySelection::Narrowed(narrowed)
        }
        None if candidate_operatories.is_empty() => {
            // No assignments configured: query across all operatories for
            // the eligible providers.
            OperatorySelection::Unfiltered
        }
        None => OperatorySelection::Narrowed(candidate_operatories),
    };

    debug!(
        "Eligibility for type {}: {} providers, operatory selection {:?}",
        appointment_type_id,
        eligible.len(),
        operatory_selection.nexhealth_ids()
    );

    Ok(EligibilityResolution {
        providers: eligible,
        operatory_selection,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(id: i64, active: bool, accepted: Vec<i64>, operatories: Vec<i64>) -> SavedProvider {
        SavedProvider {
            id,
            nexhealth_provider_id: id + 1000,
            name: format!("Provider {}", id),
            is_active: active,
            accepted_appointment_type_ids: accepted,
            assigned_operatory_ids: operatories,
        }
    }

    fn operatory(id: i64, active: bool) -> SavedOperatory {
        SavedOperatory {
            id,
            nexhealth_operatory_id: id + 2000,
            name: format!("Operatory {}", id),
            is_active: active,
        }
    }

    fn practice(providers: Vec<SavedProvider>, operatories: Vec<SavedOperatory>) -> PracticeSnapshot {
        PracticeSnapshot {
            id: "practice-1".to_string(),
            nexhealth_subdomain: "smiles".to_string(),
            nexhealth_location_id: 1,
            timezone: Some("America/Chicago".to_string()),
            appointment_types: vec![],
            providers,
            operatories,
        }
    }

    #[test]
    fn provider_eligible_iff_active_and_accepting() {
        let practice = practice(
            vec![
                provider(1, true, vec![7], vec![]),        // accepts type 7
                provider(2, true, vec![], vec![]),         // accepts all
                provider(3, true, vec![8], vec![]),        // wrong type
                provider(4, false, vec![7], vec![]),       // inactive
            ],
            vec![],
        );

        let resolution = resolve_eligibility(&practice, 7, "Cleaning", None, None).unwrap();
        let ids: Vec<i64> = resolution.providers.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn explicit_provider_filter_intersects() {
        let practice = practice(
            vec![
                provider(1, true, vec![], vec![]),
                provider(2, true, vec![], vec![]),
            ],
            vec![],
        );

        let resolution = resolve_eligibility(&practice, 7, "Cleaning", Some(&[2]), None).unwrap();
        let ids: Vec<i64> = resolution.providers.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn empty_eligible_set_fails_with_no_providers_for_type() {
        let practice = practice(vec![provider(1, true, vec![8], vec![])], vec![]);

        let err = resolve_eligibility(&practice, 7, "Cleaning", None, None).unwrap_err();
        assert_eq!(
            err,
            PracticeError::NoProvidersForType {
                type_name: "Cleaning".to_string()
            }
        );
    }

    #[test]
    fn no_saved_providers_and_no_active_providers_are_distinct() {
        let empty = practice(vec![], vec![]);
        assert_eq!(
            resolve_eligibility(&empty, 7, "Cleaning", None, None).unwrap_err(),
            PracticeError::NoSavedProviders
        );

        let all_inactive = practice(vec![provider(1, false, vec![], vec![])], vec![]);
        assert_eq!(
            resolve_eligibility(&all_inactive, 7, "Cleaning", None, None).unwrap_err(),
            PracticeError::NoActiveProviders
        );
    }

    #[test]
    fn operatory_union_deduplicates_and_skips_inactive() {
        let practice = practice(
            vec![
                provider(1, true, vec![], vec![10, 11]),
                provider(2, true, vec![], vec![11, 12, 13]),
            ],
            vec![
                operatory(10, true),
                operatory(11, true),
                operatory(12, false), // inactive, excluded
                operatory(13, true),
            ],
        );

        let resolution = resolve_eligibility(&practice, 7, "Cleaning", None, None).unwrap();
        let ids: Vec<i64> = resolution
            .operatory_selection
            .operatories()
            .iter()
            .map(|op| op.id)
            .collect();
        assert_eq!(ids, vec![10, 11, 13]);
    }

    #[test]
    fn no_assignments_yields_unfiltered_selection() {
        let practice = practice(
            vec![provider(1, true, vec![], vec![])],
            vec![operatory(10, true)],
        );

        let resolution = resolve_eligibility(&practice, 7, "Cleaning", None, None).unwrap();
        assert_eq!(resolution.operatory_selection, OperatorySelection::Unfiltered);
        assert!(resolution.operatory_selection.nexhealth_ids().is_empty());
    }

    #[test]
    fn supplied_filter_emptying_the_set_stays_narrowed_not_unfiltered() {
        let practice = practice(
            vec![provider(1, true, vec![], vec![10])],
            vec![operatory(10, true)],
        );

        let resolution =
            resolve_eligibility(&practice, 7, "Cleaning", None, Some(&[99])).unwrap();
        assert_eq!(
            resolution.operatory_selection,
            OperatorySelection::Narrowed(vec![])
        );
    }

    #[test]
    fn first_eligible_policy_is_stable_id_order() {
        let practice = practice(
            vec![
                provider(5, true, vec![], vec![20]),
                provider(2, true, vec![], vec![21]),
            ],
            vec![operatory(20, true), operatory(21, true)],
        );

        let resolution = resolve_eligibility(&practice, 7, "Cleaning", None, None).unwrap();
        assert_eq!(resolution.first_provider().unwrap().id, 2);
        assert_eq!(resolution.first_operatory().unwrap().id, 20);
    }
}
