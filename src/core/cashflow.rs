use super::returns::MarketRates;
use super::types::{
    Person, RentalIncome, SimulationParameters, TrialState, YearRecord, amount_in_year,
};

/// Bridge healthcare stops once public coverage starts.
const PUBLIC_COVERAGE_AGE: u32 = 65;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaxOutcome {
    pub tax: f64,
    /// Shortfall plus the tax owed on withdrawing it.
    pub portfolio_draw: f64,
}

fn compound(amount: f64, rate: f64, periods: u32) -> f64 {
    amount * (1.0 + rate).powi(periods as i32)
}

/// Diagnostic ratio; zero where the denominator makes it undefined.
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let value = numerator / denominator;
    if value.is_finite() { value } else { 0.0 }
}

pub fn earnings(base: f64, growth: f64, year: u32, age: u32, retirement_age: u32) -> f64 {
    if age < retirement_age {
        compound(base, growth, year)
    } else {
        0.0
    }
}

pub fn pension(person: &Person, age: u32) -> f64 {
    if age < person.retirement_age {
        return 0.0;
    }
    compound(
        person.annual_pension,
        person.pension_growth,
        age - person.retirement_age,
    )
}

pub fn social_security(annual_amount: f64, start_age: u32, cola_rate: f64, age: u32) -> f64 {
    if age < start_age {
        return 0.0;
    }
    compound(annual_amount, cola_rate, age - start_age)
}

pub fn rental_income(rental: &RentalIncome, calendar_year: i32) -> f64 {
    if calendar_year < rental.start_year || calendar_year > rental.end_year {
        return 0.0;
    }
    compound(
        rental.annual_amount,
        rental.yearly_increase,
        calendar_year.abs_diff(rental.start_year),
    )
}

pub fn mortgage_payment(params: &SimulationParameters, year: u32) -> f64 {
    if year < params.mortgage_years_remaining {
        params.mortgage_payment
    } else {
        0.0
    }
}

pub fn bridge_healthcare(person: &Person, age: u32, inflation_mean: f64) -> f64 {
    if age < person.healthcare_start_age || age >= PUBLIC_COVERAGE_AGE {
        return 0.0;
    }
    compound(
        person.healthcare_cost,
        inflation_mean,
        age - person.healthcare_start_age,
    )
}

/// Next expense baseline. Year 0 keeps the (adjusted) baseline as is.
pub fn escalate_expense(
    adjusted_base: f64,
    year: u32,
    inflation_rate: f64,
    decline: f64,
    both_retired: bool,
) -> f64 {
    if year == 0 {
        return adjusted_base;
    }
    if both_retired {
        adjusted_base * (1.0 + inflation_rate - decline)
    } else {
        adjusted_base * (1.0 + inflation_rate)
    }
}

pub fn settle_tax(total_expense: f64, gross_income: f64, tax_rate: f64) -> TaxOutcome {
    let estimated_tax = gross_income * tax_rate;
    let net_income = gross_income - estimated_tax;
    if total_expense <= net_income {
        return TaxOutcome {
            tax: estimated_tax,
            portfolio_draw: 0.0,
        };
    }

    let shortfall = total_expense - net_income;
    let draw_tax = shortfall * tax_rate;
    TaxOutcome {
        tax: estimated_tax + draw_tax,
        portfolio_draw: shortfall + draw_tax,
    }
}

pub fn investment_return(balance: f64, params: &SimulationParameters, rates: MarketRates) -> f64 {
    let stocks = balance * (params.stock_percentage / 100.0);
    let bonds = balance * (params.bond_percentage / 100.0);
    stocks * rates.equity + bonds * rates.bond
}

/// Projects one year of household cash flow.
///
/// `year` is the zero-based offset from `params.start_year`; `inflation_rate` is this
/// year's stochastic inflation draw. Returns the year's record and the state to carry
/// into `year + 1`.
pub fn project_year(
    state: &TrialState,
    year: u32,
    params: &SimulationParameters,
    rates: MarketRates,
    inflation_rate: f64,
) -> (YearRecord, TrialState) {
    let calendar_year = params.calendar_year(year);
    let primary_age = params.primary.current_age.saturating_add(year);
    let partner_age = params.partner.current_age.saturating_add(year);

    let primary_earnings = earnings(
        state.primary_earnings_base,
        params.primary.earnings_growth,
        year,
        primary_age,
        params.primary.retirement_age,
    );
    let partner_earnings = earnings(
        state.partner_earnings_base,
        params.partner.earnings_growth,
        year,
        partner_age,
        params.partner.retirement_age,
    );
    let primary_pension = pension(&params.primary, primary_age);
    let partner_pension = pension(&params.partner, partner_age);
    let primary_social_security = social_security(
        params.primary.social_security,
        params.primary.social_security_start_age,
        params.cola_rate,
        primary_age,
    );
    let partner_social_security = social_security(
        params.partner.social_security,
        params.partner.social_security_start_age,
        params.cola_rate,
        partner_age,
    );
    let rental = rental_income(&params.rental, calendar_year);
    let gross_income = primary_earnings
        + partner_earnings
        + primary_pension
        + partner_pension
        + primary_social_security
        + partner_social_security
        + rental;

    let mortgage = mortgage_payment(params, year);
    let primary_healthcare = bridge_healthcare(&params.primary, primary_age, params.inflation_mean);
    let partner_healthcare = bridge_healthcare(&params.partner, partner_age, params.inflation_mean);
    let healthcare = primary_healthcare + partner_healthcare;

    let expense_adjustment = amount_in_year(&params.expense_adjustments, calendar_year);
    let both_retired =
        primary_age >= params.primary.retirement_age && partner_age >= params.partner.retirement_age;
    let base_expense = escalate_expense(
        state.expense_base + expense_adjustment,
        year,
        inflation_rate,
        params.expense_decline,
        both_retired,
    );
    let one_time_expense = amount_in_year(&params.one_time_expenses, calendar_year);
    let total_expense = base_expense + mortgage + healthcare + one_time_expense;

    let TaxOutcome {
        tax,
        portfolio_draw,
    } = settle_tax(total_expense, gross_income, params.tax_rate);

    let beginning_balance = state.balance;
    let investment_return = investment_return(beginning_balance, params, rates);
    let ending_balance =
        beginning_balance + investment_return + gross_income - total_expense - tax;
    let ending_balance_real = ending_balance / (1.0 + params.inflation_mean).powi(year as i32 + 1);

    let downsize_proceeds = if year == params.downsize.year_offset {
        params.downsize.proceeds
    } else {
        0.0
    };
    let windfall = amount_in_year(&params.windfalls, calendar_year);

    let record = YearRecord {
        year: calendar_year,
        year_index: year,
        primary_age,
        partner_age,
        beginning_balance,
        ending_balance,
        ending_balance_real,
        gross_income,
        primary_earnings,
        partner_earnings,
        primary_pension,
        partner_pension,
        rental_income: rental,
        primary_social_security,
        partner_social_security,
        combined_social_security: primary_social_security + partner_social_security,
        total_expense,
        base_expense,
        mortgage,
        healthcare,
        primary_healthcare,
        partner_healthcare,
        one_time_expense,
        expense_adjustment,
        windfall,
        inflation_rate,
        tax,
        portfolio_draw,
        draw_rate: ratio(portfolio_draw, ending_balance),
        investment_return,
        return_rate: ratio(investment_return, beginning_balance),
        downsize_proceeds,
    };

    let next = TrialState {
        balance: ending_balance + downsize_proceeds + windfall,
        primary_earnings_base: state.primary_earnings_base,
        partner_earnings_base: state.partner_earnings_base,
        expense_base: base_expense,
    };

    (record, next)
}
