use crate::model::WeightResult;

/// What the user sees in the weight slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightFieldState {
    Empty,
    Computing,
    Computed,
    Manual,
}

impl WeightFieldState {
    pub fn of(weight: Option<&WeightResult>, computing: bool) -> Self {
        match weight {
            Some(w) if w.is_manual() => WeightFieldState::Manual,
            _ if computing => WeightFieldState::Computing,
            Some(w) if w.computed && w.value.is_some() => WeightFieldState::Computed,
            _ => WeightFieldState::Empty,
        }
    }
}

/// Change to apply to the weight slot after an estimation.
#[derive(Debug, Clone, PartialEq)]
pub enum WeightUpdate {
    Keep,
    Write(WeightResult),
    Clear,
}

/// Decide how an estimation result lands in the weight slot.
///
/// A manual weight is never touched. A new value is written only when it
/// differs from the computed one; no value clears a computed weight.
pub fn next_weight_update(current: Option<&WeightResult>, estimate: Option<&WeightResult>) -> WeightUpdate {
    if current.is_some_and(WeightResult::is_manual) {
        return WeightUpdate::Keep;
    }
    match estimate {
        Some(new) => {
            let unchanged = current
                .is_some_and(|c| c.computed && c.value == new.value && c.unit == new.unit);
            if unchanged {
                WeightUpdate::Keep
            } else {
                WeightUpdate::Write(new.clone())
            }
        }
        None => {
            if current.is_some_and(|c| c.computed && c.value.is_some()) {
                WeightUpdate::Clear
            } else {
                WeightUpdate::Keep
            }
        }
    }
}
