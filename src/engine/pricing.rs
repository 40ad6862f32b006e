use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::driver::VehicleClass;

const DEFAULT_BASE_FEE: i64 = 60;
const DEFAULT_ROUNDING_INCREMENT: i64 = 50;
const DEFAULT_DISTANCE_KM: u32 = 400;

/// Waiting tiers as (from minute, until minute, rate per minute). Minutes up
/// to the first tier's start are free.
const WAITING_TIERS: [(u32, Option<u32>, i64); 3] = [(2, Some(5), 3), (5, Some(7), 4), (7, None, 5)];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassTariff {
    pub per_km: i64,
    pub min_price: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub from: String,
    pub to: String,
    pub km: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tariffs {
    pub base_fee: i64,
    pub rounding_increment: i64,
    pub default_distance_km: u32,
    pub classes: HashMap<VehicleClass, ClassTariff>,
    pub cities: Vec<City>,
    pub routes: Vec<Route>,
}

impl Default for Tariffs {
    fn default() -> Self {
        let classes = HashMap::from([
            (
                VehicleClass::Economy,
                ClassTariff {
                    per_km: 12,
                    min_price: 500,
                },
            ),
            (
                VehicleClass::Comfort,
                ClassTariff {
                    per_km: 15,
                    min_price: 700,
                },
            ),
            (
                VehicleClass::Business,
                ClassTariff {
                    per_km: 22,
                    min_price: 1000,
                },
            ),
        ]);

        let cities = [
            ("Moscow", "Moscow & Upper Volga"),
            ("Tver", "Moscow & Upper Volga"),
            ("Yaroslavl", "Moscow & Upper Volga"),
            ("Vladimir", "Central"),
            ("Tula", "Central"),
            ("Ryazan", "Central"),
            ("Kaluga", "Central"),
        ]
        .into_iter()
        .map(|(name, region)| City {
            name: name.to_string(),
            region: region.to_string(),
        })
        .collect();

        let routes = [
            ("Moscow", "Tver", 180),
            ("Moscow", "Yaroslavl", 270),
            ("Moscow", "Vladimir", 190),
            ("Moscow", "Tula", 185),
            ("Moscow", "Ryazan", 200),
            ("Moscow", "Kaluga", 190),
            ("Tver", "Yaroslavl", 290),
            ("Vladimir", "Yaroslavl", 200),
            ("Tula", "Kaluga", 110),
            ("Tula", "Ryazan", 180),
        ]
        .into_iter()
        .map(|(from, to, km)| Route {
            from: from.to_string(),
            to: to.to_string(),
            km,
        })
        .collect();

        Self {
            base_fee: DEFAULT_BASE_FEE,
            rounding_increment: DEFAULT_ROUNDING_INCREMENT,
            default_distance_km: DEFAULT_DISTANCE_KM,
            classes,
            cities,
            routes,
        }
    }
}

impl Tariffs {
    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AppError::Internal(format!("failed to read tariffs {}: {err}", path.display()))
        })?;

        serde_json::from_str(&raw)
            .map_err(|err| AppError::Internal(format!("invalid tariffs {}: {err}", path.display())))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quote {
    pub price: i64,
    pub distance_km: u32,
}

/// Static-table pricing. Identical inputs always yield identical quotes.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    base_fee: i64,
    rounding_increment: i64,
    default_distance_km: u32,
    classes: HashMap<VehicleClass, ClassTariff>,
    distances: HashMap<(String, String), u32>,
    cities: Vec<City>,
}

impl PricingEngine {
    pub fn new(tariffs: Tariffs) -> Result<Self, AppError> {
        if tariffs.rounding_increment <= 0 {
            return Err(AppError::Internal(
                "rounding_increment must be > 0".to_string(),
            ));
        }

        if let Some(missing) = VehicleClass::ALL
            .iter()
            .find(|class| !tariffs.classes.contains_key(class))
        {
            return Err(AppError::Internal(format!("no tariff for class {missing}")));
        }

        let distances = tariffs
            .routes
            .into_iter()
            .map(|route| ((route.from, route.to), route.km))
            .collect();

        Ok(Self {
            base_fee: tariffs.base_fee,
            rounding_increment: tariffs.rounding_increment,
            default_distance_km: tariffs.default_distance_km,
            classes: tariffs.classes,
            distances,
            cities: tariffs.cities,
        })
    }

    pub fn cities(&self) -> &[City] {
        &self.cities
    }

    pub fn is_known_city(&self, name: &str) -> bool {
        self.cities.iter().any(|city| city.name == name)
    }

    /// Undirected lookup; unknown pairs fall back to the default distance.
    pub fn distance_km(&self, origin: &str, destination: &str) -> u32 {
        let forward = (origin.to_string(), destination.to_string());
        let backward = (destination.to_string(), origin.to_string());

        self.distances
            .get(&forward)
            .or_else(|| self.distances.get(&backward))
            .copied()
            .unwrap_or(self.default_distance_km)
    }

    pub fn quote(&self, origin: &str, destination: &str, class: VehicleClass) -> Quote {
        let distance_km = self.distance_km(origin, destination);
        let tariff = self
            .classes
            .get(&class)
            .copied()
            .unwrap_or(ClassTariff {
                per_km: 0,
                min_price: 0,
            });

        let raw = self.base_fee + i64::from(distance_km) * tariff.per_km;
        let price = round_to_increment(raw, self.rounding_increment).max(tariff.min_price);

        Quote { price, distance_km }
    }
}

/// Nearest multiple of `increment`; exact halves go to the even multiple.
pub fn round_to_increment(value: i64, increment: i64) -> i64 {
    let quotient = value.div_euclid(increment);
    let remainder = value.rem_euclid(increment);

    let rounded = match (remainder * 2).cmp(&increment) {
        Ordering::Less => quotient,
        Ordering::Greater => quotient + 1,
        Ordering::Equal if quotient % 2 == 0 => quotient,
        Ordering::Equal => quotient + 1,
    };

    rounded * increment
}

/// Tiered charge accumulated continuously across tier boundaries.
pub fn waiting_surcharge(minutes: u32) -> i64 {
    WAITING_TIERS
        .iter()
        .map(|&(from, until, rate)| {
            let upper = until.map_or(minutes, |until| minutes.min(until));
            i64::from(upper.saturating_sub(from)) * rate
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PricingEngine {
        PricingEngine::new(Tariffs::default()).unwrap()
    }

    #[test]
    fn quote_is_symmetric_for_every_route() {
        let engine = engine();
        for route in Tariffs::default().routes {
            for class in VehicleClass::ALL {
                let there = engine.quote(&route.from, &route.to, class);
                let back = engine.quote(&route.to, &route.from, class);
                assert_eq!(there, back);
                assert_eq!(there.distance_km, route.km);
            }
        }
    }

    #[test]
    fn quote_is_deterministic() {
        let engine = engine();
        let first = engine.quote("Moscow", "Tula", VehicleClass::Comfort);
        for _ in 0..10 {
            assert_eq!(engine.quote("Moscow", "Tula", VehicleClass::Comfort), first);
        }
    }

    #[test]
    fn economy_moscow_to_tver_rounds_down_to_increment() {
        // 60 + 180 * 12 = 2220
        let quote = engine().quote("Moscow", "Tver", VehicleClass::Economy);
        assert_eq!(quote.distance_km, 180);
        assert_eq!(quote.price, 2200);
    }

    #[test]
    fn unknown_pair_uses_default_distance() {
        // 60 + 400 * 12 = 4860
        let quote = engine().quote("Tver", "Kaluga", VehicleClass::Economy);
        assert_eq!(quote.distance_km, 400);
        assert_eq!(quote.price, 4850);
    }

    #[test]
    fn short_route_is_floored_at_class_minimum() {
        let mut tariffs = Tariffs::default();
        tariffs.routes.push(Route {
            from: "Tula".to_string(),
            to: "Shchyokino".to_string(),
            km: 5,
        });
        let engine = PricingEngine::new(tariffs).unwrap();

        assert_eq!(engine.quote("Tula", "Shchyokino", VehicleClass::Economy).price, 500);
        assert_eq!(engine.quote("Tula", "Shchyokino", VehicleClass::Business).price, 1000);
    }

    #[test]
    fn exact_halves_round_to_even_multiple() {
        assert_eq!(round_to_increment(75, 50), 100);
        assert_eq!(round_to_increment(125, 50), 100);
        assert_eq!(round_to_increment(124, 50), 100);
        assert_eq!(round_to_increment(126, 50), 150);
    }

    #[test]
    fn missing_class_tariff_is_rejected() {
        let mut tariffs = Tariffs::default();
        tariffs.classes.remove(&VehicleClass::Business);
        assert!(PricingEngine::new(tariffs).is_err());
    }

    #[test]
    fn waiting_surcharge_matches_tier_table() {
        let expected = [(0, 0), (1, 0), (2, 0), (3, 3), (5, 9), (6, 13), (7, 17), (10, 32)];
        for (minutes, charge) in expected {
            assert_eq!(waiting_surcharge(minutes), charge, "minutes = {minutes}");
        }
    }

    #[test]
    fn waiting_surcharge_never_decreases() {
        let charges: Vec<i64> = (0..60).map(waiting_surcharge).collect();
        assert!(charges.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}
