use super::types::{
    DatedAmount, Downsize, Person, RentalIncome, ReturnModel, SimulationParameters,
};

/// A two-earner household five years from retirement.
pub(crate) fn sample_parameters() -> SimulationParameters {
    SimulationParameters {
        start_year: 2025,
        life_expectancy: 92,
        primary: Person {
            current_age: 55,
            retirement_age: 60,
            annual_earnings: 200_000.0,
            earnings_growth: 0.05,
            annual_pension: 10_000.0,
            pension_growth: 0.01,
            social_security: 36_000.0,
            social_security_start_age: 67,
            healthcare_cost: 5_000.0,
            healthcare_start_age: 60,
        },
        partner: Person {
            current_age: 50,
            retirement_age: 58,
            annual_earnings: 150_000.0,
            earnings_growth: 0.04,
            annual_pension: 0.0,
            pension_growth: 0.0,
            social_security: 18_000.0,
            social_security_start_age: 65,
            healthcare_cost: 5_000.0,
            healthcare_start_age: 58,
        },
        initial_savings: 2_000_000.0,
        stock_percentage: 60.0,
        bond_percentage: 40.0,
        stock_return_mean: 0.10,
        stock_return_std: 0.19,
        bond_return_mean: 0.0375,
        bond_return_std: 0.012,
        rental: RentalIncome {
            start_year: 2030,
            end_year: 2040,
            annual_amount: 24_000.0,
            yearly_increase: 0.02,
        },
        annual_expense: 120_000.0,
        mortgage_payment: 36_000.0,
        mortgage_years_remaining: 25,
        tax_rate: 0.10,
        inflation_mean: 0.025,
        inflation_std: 0.01,
        expense_decline: 0.005,
        cola_rate: 0.015,
        downsize: Downsize {
            year_offset: 10,
            proceeds: 300_000.0,
        },
        expense_adjustments: vec![DatedAmount::new(2035, -12_000.0)],
        one_time_expenses: vec![DatedAmount::new(2028, 40_000.0)],
        windfalls: vec![DatedAmount::new(2032, 100_000.0)],
        return_model: ReturnModel::Normal,
        trials: 200,
        seed: 42,
    }
}

/// Everything zeroed except the savings balance; returns and inflation fixed at zero.
pub(crate) fn quiet_parameters() -> SimulationParameters {
    let idle = |age: u32| Person {
        current_age: age,
        retirement_age: age,
        annual_earnings: 0.0,
        earnings_growth: 0.0,
        annual_pension: 0.0,
        pension_growth: 0.0,
        social_security: 0.0,
        social_security_start_age: 200,
        healthcare_cost: 0.0,
        healthcare_start_age: 200,
    };
    SimulationParameters {
        start_year: 2025,
        life_expectancy: 66,
        primary: idle(65),
        partner: idle(65),
        initial_savings: 100_000.0,
        stock_percentage: 60.0,
        bond_percentage: 40.0,
        stock_return_mean: 0.0,
        stock_return_std: 0.0,
        bond_return_mean: 0.0,
        bond_return_std: 0.0,
        rental: RentalIncome {
            start_year: 0,
            end_year: -1,
            annual_amount: 0.0,
            yearly_increase: 0.0,
        },
        annual_expense: 0.0,
        mortgage_payment: 0.0,
        mortgage_years_remaining: 0,
        tax_rate: 0.0,
        inflation_mean: 0.0,
        inflation_std: 0.0,
        expense_decline: 0.0,
        cola_rate: 0.0,
        downsize: Downsize {
            year_offset: 0,
            proceeds: 0.0,
        },
        expense_adjustments: Vec::new(),
        one_time_expenses: Vec::new(),
        windfalls: Vec::new(),
        return_model: ReturnModel::Normal,
        trials: 25,
        seed: 7,
    }
}
