//! Step machines for the multi-step conversation flows. Each step validates
//! its input before advancing; a rejected input leaves the draft unchanged.

use crate::error::AppError;
use crate::models::trip::TripId;
use crate::validation;

#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Phone,
    DriverOnboarding(OnboardingDraft),
    Review(ReviewDraft),
}

impl Flow {
    pub fn name(&self) -> &'static str {
        match self {
            Flow::Phone => "phone",
            Flow::DriverOnboarding(_) => "driver_onboarding",
            Flow::Review(_) => "review",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingStep {
    FullName,
    VehicleModel,
    Plate,
    Experience,
}

impl OnboardingStep {
    pub fn prompt(&self) -> &'static str {
        match self {
            OnboardingStep::FullName => "Enter your full name (first and last):",
            OnboardingStep::VehicleModel => "Enter the vehicle make and model:",
            OnboardingStep::Plate => "Enter the plate number (e.g. A123BC77):",
            OnboardingStep::Experience => "Enter your driving experience in full years:",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OnboardingDraft {
    pub step: OnboardingStep,
    pub full_name: Option<String>,
    pub vehicle_model: Option<String>,
    pub plate_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriverApplication {
    pub full_name: String,
    pub vehicle_model: String,
    pub plate_number: String,
    pub experience_years: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OnboardingProgress {
    Next(OnboardingStep),
    Complete(DriverApplication),
}

impl Default for OnboardingDraft {
    fn default() -> Self {
        Self::new()
    }
}

impl OnboardingDraft {
    pub fn new() -> Self {
        Self {
            step: OnboardingStep::FullName,
            full_name: None,
            vehicle_model: None,
            plate_number: None,
        }
    }

    pub fn advance(&mut self, input: &str) -> Result<OnboardingProgress, AppError> {
        match self.step {
            OnboardingStep::FullName => {
                self.full_name = Some(validation::validate_full_name(input)?);
                self.step = OnboardingStep::VehicleModel;
            }
            OnboardingStep::VehicleModel => {
                self.vehicle_model = Some(validation::validate_vehicle_model(input)?);
                self.step = OnboardingStep::Plate;
            }
            OnboardingStep::Plate => {
                self.plate_number = Some(validation::validate_plate(input)?);
                self.step = OnboardingStep::Experience;
            }
            OnboardingStep::Experience => {
                let experience_years = validation::validate_experience(input)?;
                return self.finish(experience_years);
            }
        }
        Ok(OnboardingProgress::Next(self.step))
    }

    fn finish(&self, experience_years: u8) -> Result<OnboardingProgress, AppError> {
        match (&self.full_name, &self.vehicle_model, &self.plate_number) {
            (Some(full_name), Some(vehicle_model), Some(plate_number)) => {
                Ok(OnboardingProgress::Complete(DriverApplication {
                    full_name: full_name.clone(),
                    vehicle_model: vehicle_model.clone(),
                    plate_number: plate_number.clone(),
                    experience_years,
                }))
            }
            _ => Err(AppError::Internal(
                "onboarding reached the last step with missing fields".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewDraft {
    pub trip_id: TripId,
    pub rating: Option<u8>,
}

/// Route picked so far in the new-trip menus.
#[derive(Debug, Clone, PartialEq)]
pub struct TripDraft {
    pub origin: String,
    pub destination: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn onboarding_walks_all_steps_in_order() {
        let mut draft = OnboardingDraft::new();

        assert_eq!(
            draft.advance("Ivan Petrov").unwrap(),
            OnboardingProgress::Next(OnboardingStep::VehicleModel)
        );
        assert_eq!(
            draft.advance("Lada Vesta").unwrap(),
            OnboardingProgress::Next(OnboardingStep::Plate)
        );
        assert_eq!(
            draft.advance("a123bc77").unwrap(),
            OnboardingProgress::Next(OnboardingStep::Experience)
        );

        let OnboardingProgress::Complete(application) = draft.advance("12").unwrap() else {
            panic!("expected completed application");
        };
        assert_eq!(application.full_name, "Ivan Petrov");
        assert_eq!(application.plate_number, "A123BC77");
        assert_eq!(application.experience_years, 12);
    }

    #[test]
    fn invalid_input_keeps_step_and_prior_fields() {
        let mut draft = OnboardingDraft::new();
        draft.advance("Ivan Petrov").unwrap();
        draft.advance("Lada Vesta").unwrap();

        let before = draft.clone();
        assert!(matches!(draft.advance("A1"), Err(AppError::Validation(_))));
        assert_eq!(draft, before);
        assert_eq!(draft.step, OnboardingStep::Plate);
        assert_eq!(draft.full_name.as_deref(), Some("Ivan Petrov"));

        draft.advance("A123BC77").unwrap();
        assert!(draft.advance("71").is_err());
        assert_eq!(draft.step, OnboardingStep::Experience);
    }
}
