use rand::Rng;
use rand::seq::SliceRandom;
use rand_distr::{Distribution, LogNormal, Normal, StudentT};

use super::error::SimulationError;
use super::history::{HistoricalReturnsTable, ReturnBounds};
use super::types::{ReturnModel, SimulationParameters};

const STUDENT_T_DEGREES_OF_FREEDOM: f64 = 5.0;

/// Equity and bond return for one projected year, as decimals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketRates {
    pub equity: f64,
    pub bond: f64,
}

#[derive(Debug, Clone, Copy)]
struct LocationScale {
    mean: f64,
    std: f64,
}

impl LocationScale {
    fn place(self, standard: f64) -> f64 {
        self.mean + self.std * standard
    }
}

#[derive(Debug, Clone)]
enum Sampler {
    Bootstrap {
        with_replacement: bool,
    },
    Normal {
        equity: Normal<f64>,
        bond: Normal<f64>,
        equity_bounds: ReturnBounds,
        bond_bounds: ReturnBounds,
    },
    Lognormal {
        equity: LogNormal<f64>,
        bond: LogNormal<f64>,
    },
    StudentT {
        shape: StudentT<f64>,
        equity: LocationScale,
        bond: LocationScale,
    },
}

/// Produces a trial's year-indexed return path under the configured model.
///
/// Distributions are built once per run; `generate` only consumes randomness
/// from the caller's per-trial generator.
#[derive(Debug, Clone)]
pub struct ReturnModelGenerator<'a> {
    table: &'a HistoricalReturnsTable,
    sampler: Sampler,
}

impl<'a> ReturnModelGenerator<'a> {
    pub fn new(
        params: &SimulationParameters,
        table: &'a HistoricalReturnsTable,
    ) -> Result<Self, SimulationError> {
        let sampler = match params.return_model {
            ReturnModel::Empirical => Sampler::Bootstrap {
                with_replacement: true,
            },
            ReturnModel::Historical => Sampler::Bootstrap {
                with_replacement: false,
            },
            ReturnModel::Normal => Sampler::Normal {
                equity: normal("stock", params.stock_return_mean, params.stock_return_std)?,
                bond: normal("bond", params.bond_return_mean, params.bond_return_std)?,
                equity_bounds: table.equity_bounds(),
                bond_bounds: table.bond_bounds(),
            },
            ReturnModel::Lognormal => Sampler::Lognormal {
                equity: lognormal("stock", params.stock_return_mean, params.stock_return_std)?,
                bond: lognormal("bond", params.bond_return_mean, params.bond_return_std)?,
            },
            ReturnModel::StudentT => Sampler::StudentT {
                shape: StudentT::new(STUDENT_T_DEGREES_OF_FREEDOM).map_err(|e| {
                    SimulationError::Configuration(format!("invalid Student's t shape: {e}"))
                })?,
                equity: LocationScale {
                    mean: params.stock_return_mean,
                    std: params.stock_return_std,
                },
                bond: LocationScale {
                    mean: params.bond_return_mean,
                    std: params.bond_return_std,
                },
            },
        };

        Ok(Self { table, sampler })
    }

    /// Draws `years` rates. Parametric models draw the whole equity series first,
    /// then the whole bond series.
    pub fn generate<R: Rng>(
        &self,
        years: usize,
        rng: &mut R,
    ) -> Result<Vec<MarketRates>, SimulationError> {
        match &self.sampler {
            Sampler::Bootstrap { with_replacement } => {
                self.bootstrap(years, *with_replacement, rng)
            }
            Sampler::Normal {
                equity,
                bond,
                equity_bounds,
                bond_bounds,
            } => {
                let equity = draw(equity, years, rng, |v| equity_bounds.clamp(v));
                let bond = draw(bond, years, rng, |v| bond_bounds.clamp(v));
                Ok(pair(equity, bond))
            }
            Sampler::Lognormal { equity, bond } => {
                let equity = draw(equity, years, rng, |v| v);
                let bond = draw(bond, years, rng, |v| v);
                Ok(pair(equity, bond))
            }
            Sampler::StudentT {
                shape,
                equity,
                bond,
            } => {
                let equity_series = draw(shape, years, rng, |v| equity.place(v));
                let bond_series = draw(shape, years, rng, |v| bond.place(v));
                Ok(pair(equity_series, bond_series))
            }
        }
    }

    fn bootstrap<R: Rng>(
        &self,
        years: usize,
        with_replacement: bool,
        rng: &mut R,
    ) -> Result<Vec<MarketRates>, SimulationError> {
        let sampled = self.table.sample_years(years, with_replacement, rng)?;
        let mut rates = sampled
            .into_iter()
            .map(|year| {
                self.table.lookup(year).map(|r| MarketRates {
                    equity: r.equity,
                    bond: r.bond,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        // Sampled-year order must not leak into simulated-year order.
        rates.shuffle(rng);
        Ok(rates)
    }
}

fn normal(asset: &str, mean: f64, std: f64) -> Result<Normal<f64>, SimulationError> {
    Normal::new(mean, std).map_err(|e| {
        SimulationError::Configuration(format!(
            "invalid normal parameters for {asset} returns (mean {mean}, std {std}): {e}"
        ))
    })
}

fn lognormal(asset: &str, mean: f64, std: f64) -> Result<LogNormal<f64>, SimulationError> {
    if !mean.is_finite() || mean <= 0.0 {
        return Err(SimulationError::Configuration(format!(
            "lognormal {asset} returns need a positive mean, got {mean}"
        )));
    }
    LogNormal::new(mean.ln(), std).map_err(|e| {
        SimulationError::Configuration(format!(
            "invalid lognormal parameters for {asset} returns (mean {mean}, std {std}): {e}"
        ))
    })
}

fn draw<D, R, F>(dist: &D, n: usize, rng: &mut R, map: F) -> Vec<f64>
where
    D: Distribution<f64>,
    R: Rng,
    F: Fn(f64) -> f64,
{
    (0..n).map(|_| map(dist.sample(rng))).collect()
}

fn pair(equity: Vec<f64>, bond: Vec<f64>) -> Vec<MarketRates> {
    equity
        .into_iter()
        .zip(bond)
        .map(|(equity, bond)| MarketRates { equity, bond })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures::sample_parameters;
    use proptest::prelude::{any, prop_assert, proptest};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    const EPS: f64 = 1e-12;

    fn generator_for(
        model: ReturnModel,
        table: &HistoricalReturnsTable,
        adjust: impl FnOnce(&mut SimulationParameters),
    ) -> ReturnModelGenerator<'_> {
        let mut params = sample_parameters();
        params.return_model = model;
        adjust(&mut params);
        ReturnModelGenerator::new(&params, table).expect("valid generator")
    }

    #[test]
    fn normal_with_zero_std_returns_the_means() {
        let table = HistoricalReturnsTable::us_market();
        let generator = generator_for(ReturnModel::Normal, &table, |p| {
            p.stock_return_mean = 0.05;
            p.stock_return_std = 0.0;
            p.bond_return_mean = 0.03;
            p.bond_return_std = 0.0;
        });
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let rates = generator.generate(12, &mut rng).expect("rates");
        assert_eq!(rates.len(), 12);
        for r in rates {
            assert!((r.equity - 0.05).abs() < EPS);
            assert!((r.bond - 0.03).abs() < EPS);
        }
    }

    #[test]
    fn normal_clamps_into_historical_bounds() {
        let table = HistoricalReturnsTable::us_market();
        let generator = generator_for(ReturnModel::Normal, &table, |p| {
            p.stock_return_mean = 5.0;
            p.stock_return_std = 0.0;
            p.bond_return_mean = -5.0;
            p.bond_return_std = 0.0;
        });
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        for r in generator.generate(5, &mut rng).expect("rates") {
            assert_eq!(r.equity, table.equity_bounds().max);
            assert_eq!(r.bond, table.bond_bounds().min);
        }
    }

    #[test]
    fn lognormal_with_zero_std_returns_the_means() {
        let table = HistoricalReturnsTable::us_market();
        let generator = generator_for(ReturnModel::Lognormal, &table, |p| {
            p.stock_return_mean = 0.07;
            p.stock_return_std = 0.0;
            p.bond_return_mean = 0.02;
            p.bond_return_std = 0.0;
        });
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        for r in generator.generate(4, &mut rng).expect("rates") {
            assert!((r.equity - 0.07).abs() < 1e-9);
            assert!((r.bond - 0.02).abs() < 1e-9);
        }
    }

    #[test]
    fn lognormal_rejects_non_positive_mean() {
        let table = HistoricalReturnsTable::us_market();
        let mut params = sample_parameters();
        params.return_model = ReturnModel::Lognormal;
        params.stock_return_mean = 0.0;
        let err = ReturnModelGenerator::new(&params, &table).expect_err("ln(0) is undefined");
        assert!(matches!(err, SimulationError::Configuration(_)));
    }

    #[test]
    fn student_t_is_located_at_mean_and_scaled_by_std() {
        let table = HistoricalReturnsTable::us_market();
        let flat = generator_for(ReturnModel::StudentT, &table, |p| {
            p.stock_return_mean = 0.08;
            p.stock_return_std = 0.0;
            p.bond_return_mean = 0.04;
            p.bond_return_std = 0.0;
        });
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        for r in flat.generate(6, &mut rng).expect("rates") {
            assert!((r.equity - 0.08).abs() < EPS);
            assert!((r.bond - 0.04).abs() < EPS);
        }

        let unit = generator_for(ReturnModel::StudentT, &table, |p| {
            p.stock_return_mean = 0.0;
            p.stock_return_std = 1.0;
            p.bond_return_mean = 1.0;
            p.bond_return_std = 2.0;
        });
        let mut left = ChaCha20Rng::seed_from_u64(5);
        let mut right = ChaCha20Rng::seed_from_u64(5);
        let shape = StudentT::new(STUDENT_T_DEGREES_OF_FREEDOM).expect("shape");
        let rates = unit.generate(3, &mut left).expect("rates");
        let equity: Vec<f64> = (0..3).map(|_| shape.sample(&mut right)).collect();
        let bond: Vec<f64> = (0..3).map(|_| 1.0 + 2.0 * shape.sample(&mut right)).collect();
        for (idx, r) in rates.iter().enumerate() {
            assert!((r.equity - equity[idx]).abs() < EPS);
            assert!((r.bond - bond[idx]).abs() < EPS);
        }
    }

    #[test]
    fn historical_bootstrap_uses_each_year_once() {
        let table = HistoricalReturnsTable::us_market();
        let generator = generator_for(ReturnModel::Historical, &table, |_| {});
        let mut rng = ChaCha20Rng::seed_from_u64(6);
        let mut drawn: Vec<f64> = generator
            .generate(table.len(), &mut rng)
            .expect("rates")
            .into_iter()
            .map(|r| r.equity)
            .collect();
        let mut expected: Vec<f64> = table
            .years()
            .map(|y| table.lookup(y).expect("year").equity)
            .collect();
        drawn.sort_by(|a, b| a.total_cmp(b));
        expected.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(drawn, expected);
    }

    #[test]
    fn empirical_bootstrap_keeps_equity_and_bond_from_the_same_year() {
        let table = HistoricalReturnsTable::us_market();
        let generator = generator_for(ReturnModel::Empirical, &table, |_| {});
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let rows: Vec<MarketRates> = table
            .years()
            .map(|y| {
                let r = table.lookup(y).expect("year");
                MarketRates {
                    equity: r.equity,
                    bond: r.bond,
                }
            })
            .collect();
        let rates = generator.generate(150, &mut rng).expect("rates");
        assert_eq!(rates.len(), 150);
        assert!(rates.iter().all(|r| rows.contains(r)));
    }

    #[test]
    fn empirical_bootstrap_reorders_the_sampled_years() {
        let table = HistoricalReturnsTable::us_market();
        let generator = generator_for(ReturnModel::Empirical, &table, |_| {});
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let mut replay = rng.clone();

        let rates = generator.generate(40, &mut rng).expect("rates");

        let in_sampled_order: Vec<MarketRates> = table
            .sample_years(40, true, &mut replay)
            .expect("years")
            .into_iter()
            .map(|y| {
                let r = table.lookup(y).expect("year");
                MarketRates {
                    equity: r.equity,
                    bond: r.bond,
                }
            })
            .collect();
        let mut shuffled = in_sampled_order.clone();
        shuffled.shuffle(&mut replay);

        assert_eq!(rates, shuffled);
        assert_ne!(rates, in_sampled_order);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(32))]

        #[test]
        fn prop_same_seed_same_path(seed in any::<u64>(), model_idx in 0usize..5) {
            let table = HistoricalReturnsTable::us_market();
            let generator = generator_for(ReturnModel::ALL[model_idx], &table, |_| {});
            let mut a = ChaCha20Rng::seed_from_u64(seed);
            let mut b = ChaCha20Rng::seed_from_u64(seed);
            let left = generator.generate(30, &mut a).expect("rates");
            let right = generator.generate(30, &mut b).expect("rates");
            prop_assert!(left == right);
        }

        #[test]
        fn prop_normal_never_leaves_historical_range(seed in any::<u64>()) {
            let table = HistoricalReturnsTable::us_market();
            let generator = generator_for(ReturnModel::Normal, &table, |p| {
                p.stock_return_std = 0.6;
                p.bond_return_std = 0.3;
            });
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            for r in generator.generate(40, &mut rng).expect("rates") {
                prop_assert!(r.equity >= table.equity_bounds().min && r.equity <= table.equity_bounds().max);
                prop_assert!(r.bond >= table.bond_bounds().min && r.bond <= table.bond_bounds().max);
            }
        }
    }
}
