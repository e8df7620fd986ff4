pub mod webhook;

use crate::domain::money::Currency;

pub fn to_stripe_currency(c: Currency) -> stripe::Currency {
    match c {
        Currency::Usd => stripe::Currency::USD,
        Currency::Eur => stripe::Currency::EUR,
        Currency::Gbp => stripe::Currency::GBP,
    }
}
