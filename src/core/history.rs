use std::collections::BTreeMap;

use rand::Rng;
use rand::seq::index;

use super::error::SimulationError;

/// Calendar year, S&P 500 total return %, 10-year US Treasury total return %.
const US_MARKET_RETURNS: &[(i32, f64, f64)] = &[
    (1928, 43.81, 0.84),
    (1929, -8.30, 4.20),
    (1930, -25.12, 4.54),
    (1931, -43.84, -2.56),
    (1932, -8.64, 8.79),
    (1933, 49.98, 1.86),
    (1934, -1.19, 7.96),
    (1935, 46.74, 4.47),
    (1936, 31.94, 5.02),
    (1937, -35.34, 1.38),
    (1938, 29.28, 4.21),
    (1939, -1.10, 4.41),
    (1940, -10.67, 5.40),
    (1941, -12.77, -2.02),
    (1942, 19.17, 2.29),
    (1943, 25.06, 2.49),
    (1944, 19.03, 2.58),
    (1945, 35.82, 3.80),
    (1946, -8.43, 3.13),
    (1947, 5.20, 0.92),
    (1948, 5.70, 1.95),
    (1949, 18.30, 4.66),
    (1950, 30.81, 0.43),
    (1951, 23.68, -0.30),
    (1952, 18.15, 2.27),
    (1953, -1.21, 4.14),
    (1954, 52.56, 3.29),
    (1955, 32.60, -1.34),
    (1956, 7.44, -2.26),
    (1957, -10.46, 6.80),
    (1958, 43.72, -2.10),
    (1959, 12.06, -2.65),
    (1960, 0.34, 11.64),
    (1961, 26.64, 2.06),
    (1962, -8.81, 5.69),
    (1963, 22.61, 1.68),
    (1964, 16.42, 3.73),
    (1965, 12.40, 0.72),
    (1966, -9.97, 2.91),
    (1967, 23.80, -1.58),
    (1968, 10.81, 3.27),
    (1969, -8.24, -5.01),
    (1970, 3.56, 16.75),
    (1971, 14.22, 9.79),
    (1972, 18.76, 2.82),
    (1973, -14.31, 3.66),
    (1974, -25.90, 1.99),
    (1975, 37.00, 3.61),
    (1976, 23.83, 15.98),
    (1977, -6.98, 1.29),
    (1978, 6.51, -0.78),
    (1979, 18.52, 0.67),
    (1980, 31.74, -2.99),
    (1981, -4.70, 8.20),
    (1982, 20.42, 32.81),
    (1983, 22.34, 3.20),
    (1984, 6.15, 13.73),
    (1985, 31.24, 25.71),
    (1986, 18.49, 24.28),
    (1987, 5.81, -4.96),
    (1988, 16.54, 8.22),
    (1989, 31.48, 17.69),
    (1990, -3.06, 6.24),
    (1991, 30.23, 15.00),
    (1992, 7.49, 9.36),
    (1993, 9.97, 14.21),
    (1994, 1.33, -8.04),
    (1995, 37.20, 23.48),
    (1996, 22.68, 1.43),
    (1997, 33.10, 9.94),
    (1998, 28.34, 14.92),
    (1999, 20.89, -8.25),
    (2000, -9.03, 16.66),
    (2001, -11.85, 5.57),
    (2002, -21.97, 15.12),
    (2003, 28.36, 0.38),
    (2004, 10.74, 4.49),
    (2005, 4.83, 2.87),
    (2006, 15.61, 1.96),
    (2007, 5.48, 10.21),
    (2008, -36.55, 20.10),
    (2009, 25.94, -11.12),
    (2010, 14.82, 8.46),
    (2011, 2.10, 16.04),
    (2012, 15.89, 2.97),
    (2013, 32.15, -9.10),
    (2014, 13.52, 10.75),
    (2015, 1.38, 1.28),
    (2016, 11.77, 0.69),
    (2017, 21.61, 2.80),
    (2018, -4.23, -0.02),
    (2019, 31.21, 9.64),
    (2020, 18.02, 11.33),
    (2021, 28.47, -4.42),
    (2022, -18.04, -17.83),
    (2023, 26.06, 3.88),
];

/// One historical year, stored as decimal rates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoricalReturn {
    pub equity: f64,
    pub bond: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnBounds {
    pub min: f64,
    pub max: f64,
}

impl ReturnBounds {
    pub fn clamp(self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone)]
pub struct HistoricalReturnsTable {
    years: BTreeMap<i32, HistoricalReturn>,
    equity_bounds: ReturnBounds,
    bond_bounds: ReturnBounds,
}

impl HistoricalReturnsTable {
    /// US equity and bond returns, 1928 onward.
    pub fn us_market() -> Self {
        Self::from_percent_rows(US_MARKET_RETURNS)
            .expect("embedded return table is well formed")
    }

    /// Builds a table from `(year, equity %, bond %)` rows.
    pub fn from_percent_rows(rows: &[(i32, f64, f64)]) -> Result<Self, SimulationError> {
        if rows.is_empty() {
            return Err(SimulationError::Data(
                "historical return table is empty".to_string(),
            ));
        }

        let mut years = BTreeMap::new();
        for &(year, equity_pct, bond_pct) in rows {
            if !equity_pct.is_finite() || !bond_pct.is_finite() {
                return Err(SimulationError::Data(format!(
                    "non-finite historical return for {year}"
                )));
            }
            let entry = HistoricalReturn {
                equity: equity_pct / 100.0,
                bond: bond_pct / 100.0,
            };
            if years.insert(year, entry).is_some() {
                return Err(SimulationError::Data(format!(
                    "duplicate historical year {year}"
                )));
            }
        }

        let bounds = |pick: fn(&HistoricalReturn) -> f64| {
            years.values().map(pick).fold(
                ReturnBounds {
                    min: f64::INFINITY,
                    max: f64::NEG_INFINITY,
                },
                |acc, v| ReturnBounds {
                    min: acc.min.min(v),
                    max: acc.max.max(v),
                },
            )
        };
        let equity_bounds = bounds(|r| r.equity);
        let bond_bounds = bounds(|r| r.bond);

        Ok(Self {
            years,
            equity_bounds,
            bond_bounds,
        })
    }

    pub fn len(&self) -> usize {
        self.years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    pub fn years(&self) -> impl Iterator<Item = i32> + '_ {
        self.years.keys().copied()
    }

    pub fn equity_bounds(&self) -> ReturnBounds {
        self.equity_bounds
    }

    pub fn bond_bounds(&self) -> ReturnBounds {
        self.bond_bounds
    }

    pub fn lookup(&self, year: i32) -> Result<HistoricalReturn, SimulationError> {
        self.years.get(&year).copied().ok_or_else(|| {
            SimulationError::Data(format!("no historical returns recorded for {year}"))
        })
    }

    /// Draws `n` calendar years. Without replacement each year appears at most once,
    /// so `n` may not exceed the table length.
    pub fn sample_years<R: Rng>(
        &self,
        n: usize,
        with_replacement: bool,
        rng: &mut R,
    ) -> Result<Vec<i32>, SimulationError> {
        let keys: Vec<i32> = self.years().collect();
        if with_replacement {
            return Ok((0..n)
                .map(|_| keys[rng.random_range(0..keys.len())])
                .collect());
        }

        if n > keys.len() {
            return Err(SimulationError::Validation(format!(
                "cannot draw {n} distinct years from a table of {}",
                keys.len()
            )));
        }
        Ok(index::sample(rng, keys.len(), n)
            .into_iter()
            .map(|i| keys[i])
            .collect())
    }
}
