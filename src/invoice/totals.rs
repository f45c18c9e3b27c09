use super::{LineItem, TaxRate, TaxType};
use rust_decimal::Decimal;

/// One aggregated (tax type, rate) entry of a tax group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatedTax {
    pub tax_type: TaxType,
    pub rate: Decimal,
    pub base: Decimal,
    pub amount: Decimal,
}

/// Invoice-level tax totals, recomputed on demand from the current item set.
///
/// Group entries keep the insertion order of first encounter; the composer
/// serializes them verbatim in that order. Grouping compares rates with exact
/// decimal equality, never with floating-point tolerance.
///
/// # Examples
/// ```rust
/// use facturae_core::invoice::{LineItem, TaxTotals, TaxType};
/// use rust_decimal::Decimal;
///
/// let items = vec![
///     LineItem::new("Widget", Decimal::from(3), "20.14".parse().unwrap())
///         .with_output_tax(TaxType::Iva, "21".parse().unwrap()),
/// ];
/// let totals = TaxTotals::compute(&items);
/// assert_eq!(totals.taxes_outputs().len(), 1);
/// assert!(totals.taxes_withheld().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaxTotals {
    taxes_outputs: Vec<AggregatedTax>,
    taxes_withheld: Vec<AggregatedTax>,
    invoice_amount: Decimal,
    gross_amount: Decimal,
    gross_amount_before_taxes: Decimal,
    total_taxes_outputs: Decimal,
    total_taxes_withheld: Decimal,
}

impl TaxTotals {
    /// Aggregate the ordered item list into invoice totals. Pure function of
    /// its input; safe to call repeatedly.
    pub fn compute(items: &[LineItem]) -> Self {
        let mut totals = TaxTotals::default();

        for item in items {
            totals.invoice_amount += item.total_amount();
            totals.gross_amount += item.gross_amount();
            totals.total_taxes_outputs += item.total_taxes_outputs();
            totals.total_taxes_withheld += item.total_taxes_withheld();

            let base = item.base_amount();
            for tax in item.output_taxes() {
                accumulate(&mut totals.taxes_outputs, tax, base, item.tax_amount(tax));
            }
            for tax in item.withheld_taxes() {
                accumulate(&mut totals.taxes_withheld, tax, base, item.tax_amount(tax));
            }
        }

        totals.gross_amount_before_taxes = totals.gross_amount;
        totals
    }

    /// Output-tax entries in first-encounter order.
    pub fn taxes_outputs(&self) -> &[AggregatedTax] {
        &self.taxes_outputs
    }

    /// Withheld-tax entries in first-encounter order.
    pub fn taxes_withheld(&self) -> &[AggregatedTax] {
        &self.taxes_withheld
    }

    /// Total amount payable: gross plus outputs minus withholdings.
    pub fn invoice_amount(&self) -> Decimal {
        self.invoice_amount
    }

    pub fn gross_amount(&self) -> Decimal {
        self.gross_amount
    }

    pub fn gross_amount_before_taxes(&self) -> Decimal {
        self.gross_amount_before_taxes
    }

    pub fn total_taxes_outputs(&self) -> Decimal {
        self.total_taxes_outputs
    }

    pub fn total_taxes_withheld(&self) -> Decimal {
        self.total_taxes_withheld
    }
}

fn accumulate(group: &mut Vec<AggregatedTax>, tax: &TaxRate, base: Decimal, amount: Decimal) {
    match group
        .iter_mut()
        .find(|entry| entry.tax_type == tax.tax_type && entry.rate == tax.rate)
    {
        Some(entry) => {
            entry.base += base;
            entry.amount += amount;
        }
        None => group.push(AggregatedTax {
            tax_type: tax.tax_type,
            rate: tax.rate,
            base,
            amount,
        }),
    }
}
