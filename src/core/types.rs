use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::SimulationError;

/// Oldest age a person may have at any point of the projection.
pub const MAX_AGE: u32 = 150;

/// Upper bound on trials per run; every trial keeps its full year-by-year record.
pub const MAX_TRIALS: u32 = 100_000;

/// Distribution used to draw yearly equity/bond returns for a trial.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ReturnModel {
    /// Bootstrap from the historical table, years drawn with replacement.
    Empirical,
    /// Bootstrap from the historical table, each year drawn at most once.
    Historical,
    Normal,
    Lognormal,
    StudentT,
}

impl ReturnModel {
    pub const ALL: [ReturnModel; 5] = [
        ReturnModel::Empirical,
        ReturnModel::Historical,
        ReturnModel::Normal,
        ReturnModel::Lognormal,
        ReturnModel::StudentT,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReturnModel::Empirical => "empirical",
            ReturnModel::Historical => "historical",
            ReturnModel::Normal => "normal",
            ReturnModel::Lognormal => "lognormal",
            ReturnModel::StudentT => "student-t",
        }
    }

}

impl fmt::Display for ReturnModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReturnModel {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .trim()
            .to_ascii_lowercase()
            .replace(['_', ' '], "-");
        let normalized = normalized
            .strip_suffix("-distribution")
            .unwrap_or(&normalized);
        match normalized {
            "empirical" | "bootstrap" | "with-replacement" => Ok(ReturnModel::Empirical),
            "historical" | "historical-sequence" | "without-replacement" => {
                Ok(ReturnModel::Historical)
            }
            "normal" | "gaussian" => Ok(ReturnModel::Normal),
            "lognormal" | "log-normal" => Ok(ReturnModel::Lognormal),
            "student-t" | "students-t" | "t" => Ok(ReturnModel::StudentT),
            _ => Err(SimulationError::Configuration(format!(
                "unsupported return model '{s}'"
            ))),
        }
    }
}

impl TryFrom<String> for ReturnModel {
    type Error = SimulationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReturnModel> for String {
    fn from(value: ReturnModel) -> Self {
        value.as_str().to_string()
    }
}

/// One member of the household.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub current_age: u32,
    pub retirement_age: u32,
    pub annual_earnings: f64,
    pub earnings_growth: f64,
    pub annual_pension: f64,
    pub pension_growth: f64,
    pub social_security: f64,
    pub social_security_start_age: u32,
    pub healthcare_cost: f64,
    pub healthcare_start_age: u32,
}

/// Rental income paid between two calendar years, inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RentalIncome {
    pub start_year: i32,
    pub end_year: i32,
    pub annual_amount: f64,
    pub yearly_increase: f64,
}

/// Lump sum added to the portfolio once, `year_offset` years into the projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Downsize {
    pub year_offset: u32,
    pub proceeds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatedAmount {
    pub year: i32,
    pub amount: f64,
}

impl DatedAmount {
    pub fn new(year: i32, amount: f64) -> Self {
        Self { year, amount }
    }
}

/// Sum of every entry dated exactly `year`.
pub fn amount_in_year(entries: &[DatedAmount], year: i32) -> f64 {
    entries
        .iter()
        .filter(|entry| entry.year == year)
        .map(|entry| entry.amount)
        .sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParameters {
    /// Calendar year of projection year 0.
    pub start_year: i32,
    pub life_expectancy: u32,
    pub primary: Person,
    pub partner: Person,
    pub initial_savings: f64,
    pub stock_percentage: f64,
    pub bond_percentage: f64,
    pub stock_return_mean: f64,
    pub stock_return_std: f64,
    pub bond_return_mean: f64,
    pub bond_return_std: f64,
    pub rental: RentalIncome,
    pub annual_expense: f64,
    pub mortgage_payment: f64,
    pub mortgage_years_remaining: u32,
    pub tax_rate: f64,
    pub inflation_mean: f64,
    pub inflation_std: f64,
    /// Yearly real decline of the expense baseline once both people are retired.
    pub expense_decline: f64,
    pub cola_rate: f64,
    pub downsize: Downsize,
    #[serde(default)]
    pub expense_adjustments: Vec<DatedAmount>,
    #[serde(default)]
    pub one_time_expenses: Vec<DatedAmount>,
    #[serde(default)]
    pub windfalls: Vec<DatedAmount>,
    pub return_model: ReturnModel,
    pub trials: u32,
    pub seed: u64,
}

impl SimulationParameters {
    /// Number of projected years, `life_expectancy - current_age + 1`.
    /// Zero when life expectancy is already behind the primary person.
    pub fn horizon_years(&self) -> u32 {
        self.life_expectancy
            .saturating_add(1)
            .saturating_sub(self.primary.current_age)
    }

    pub fn calendar_year(&self, year_index: u32) -> i32 {
        self.start_year.saturating_add_unsigned(year_index)
    }

    /// Checks run before any trial executes.
    pub fn validate(&self, historical_years: usize) -> Result<(), SimulationError> {
        let allocation = self.stock_percentage + self.bond_percentage;
        if !allocation.is_finite() || (allocation - 100.0).abs() > 1e-9 {
            return Err(SimulationError::Validation(format!(
                "stock and bond allocation must sum to 100, got {allocation}"
            )));
        }
        if self.stock_percentage < 0.0 || self.bond_percentage < 0.0 {
            return Err(SimulationError::Validation(
                "allocation percentages must be >= 0".to_string(),
            ));
        }
        for (name, age) in [
            ("primary current age", self.primary.current_age),
            ("partner current age", self.partner.current_age),
            ("life expectancy", self.life_expectancy),
        ] {
            if age > MAX_AGE {
                return Err(SimulationError::Validation(format!(
                    "{name} must be <= {MAX_AGE}, got {age}"
                )));
            }
        }
        if self.life_expectancy < self.primary.current_age {
            return Err(SimulationError::Validation(format!(
                "life expectancy {} is below current age {}",
                self.life_expectancy, self.primary.current_age
            )));
        }
        if self.start_year
            .checked_add_unsigned(self.horizon_years())
            .is_none()
        {
            return Err(SimulationError::Validation(format!(
                "start year {} leaves no room for a {}-year horizon",
                self.start_year,
                self.horizon_years()
            )));
        }
        if self.trials == 0 {
            return Err(SimulationError::Validation(
                "trial count must be > 0".to_string(),
            ));
        }
        if self.trials > MAX_TRIALS {
            return Err(SimulationError::Validation(format!(
                "trial count must be <= {MAX_TRIALS}, got {}",
                self.trials
            )));
        }
        if !(0.0..1.0).contains(&self.tax_rate) {
            return Err(SimulationError::Validation(format!(
                "tax rate must be in [0, 1), got {}",
                self.tax_rate
            )));
        }
        for (name, std) in [
            ("stock return std", self.stock_return_std),
            ("bond return std", self.bond_return_std),
            ("inflation std", self.inflation_std),
        ] {
            if !std.is_finite() || std < 0.0 {
                return Err(SimulationError::Validation(format!(
                    "{name} must be finite and >= 0, got {std}"
                )));
            }
        }
        if !self.initial_savings.is_finite() {
            return Err(SimulationError::Validation(
                "initial savings must be finite".to_string(),
            ));
        }
        let horizon = self.horizon_years() as usize;
        if self.return_model == ReturnModel::Historical && horizon > historical_years {
            return Err(SimulationError::Validation(format!(
                "horizon of {horizon} years exceeds the {historical_years} historical years \
                 available for sampling without replacement"
            )));
        }
        Ok(())
    }
}

/// Running balances carried from one projected year into the next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialState {
    pub balance: f64,
    pub primary_earnings_base: f64,
    pub partner_earnings_base: f64,
    pub expense_base: f64,
}

impl TrialState {
    pub fn initial(params: &SimulationParameters) -> Self {
        Self {
            balance: params.initial_savings,
            primary_earnings_base: params.primary.annual_earnings,
            partner_earnings_base: params.partner.annual_earnings,
            expense_base: params.annual_expense,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearRecord {
    pub year: i32,
    pub year_index: u32,
    pub primary_age: u32,
    pub partner_age: u32,
    pub beginning_balance: f64,
    pub ending_balance: f64,
    pub ending_balance_real: f64,
    pub gross_income: f64,
    pub primary_earnings: f64,
    pub partner_earnings: f64,
    pub primary_pension: f64,
    pub partner_pension: f64,
    pub rental_income: f64,
    pub primary_social_security: f64,
    pub partner_social_security: f64,
    pub combined_social_security: f64,
    pub total_expense: f64,
    pub base_expense: f64,
    pub mortgage: f64,
    pub healthcare: f64,
    pub primary_healthcare: f64,
    pub partner_healthcare: f64,
    pub one_time_expense: f64,
    pub expense_adjustment: f64,
    pub windfall: f64,
    pub inflation_rate: f64,
    pub tax: f64,
    pub portfolio_draw: f64,
    pub draw_rate: f64,
    pub investment_return: f64,
    pub return_rate: f64,
    pub downsize_proceeds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trial {
    pub id: u32,
    pub solvent: bool,
    pub records: Vec<YearRecord>,
}

impl Trial {
    pub fn terminal_balance(&self) -> f64 {
        self.records
            .last()
            .map(|record| record.ending_balance)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub success_count: u32,
    pub failure_count: u32,
    /// Ascending by terminal ending balance.
    pub trials: Vec<Trial>,
}

impl SimulationResult {
    pub fn trial_count(&self) -> u32 {
        self.success_count + self.failure_count
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.trial_count();
        if total == 0 {
            return 0.0;
        }
        self.success_count as f64 / total as f64
    }

    /// Trial at rank `floor(p / 100 * (n - 1))` of the sorted trials.
    pub fn percentile_trial(&self, p: f64) -> Option<&Trial> {
        if self.trials.is_empty() {
            return None;
        }
        let fraction = (p / 100.0).clamp(0.0, 1.0);
        let rank = (fraction * (self.trials.len() - 1) as f64).floor() as usize;
        self.trials.get(rank)
    }

    pub fn summary(&self) -> SimulationSummary {
        let terminal = |p: f64| {
            self.percentile_trial(p)
                .map(Trial::terminal_balance)
                .unwrap_or(0.0)
        };
        SimulationSummary {
            success_count: self.success_count,
            failure_count: self.failure_count,
            success_rate: self.success_rate(),
            p10_terminal_balance: terminal(10.0),
            p50_terminal_balance: terminal(50.0),
            p90_terminal_balance: terminal(90.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    pub success_count: u32,
    pub failure_count: u32,
    pub success_rate: f64,
    pub p10_terminal_balance: f64,
    pub p50_terminal_balance: f64,
    pub p90_terminal_balance: f64,
}
