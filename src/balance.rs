use std::collections::BTreeMap;

use serde::Serialize;

use crate::schemas::{Budget, Transaction, TransactionType};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetProgress {
    pub budget_id: String,
    pub category: String,
    pub limit: f64,
    pub spent: f64,
    pub remaining: f64,
    pub over: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub income: f64,
    pub expense: f64,
    pub balance: f64,
    pub spending_by_category: BTreeMap<String, f64>,
    pub budgets: Vec<BudgetProgress>,
}

/// Totals over `transactions`, optionally limited to one `YYYY-MM` month.
pub fn compute_summary(
    transactions: &[Transaction],
    budgets: &[Budget],
    month: Option<&str>,
) -> Summary {
    let mut income = 0.0;
    let mut expense = 0.0;
    let mut spending_by_category: BTreeMap<String, f64> = BTreeMap::new();

    let in_period = transactions
        .iter()
        .filter(|transaction| month.map_or(true, |month| transaction.date.starts_with(month)));
    for transaction in in_period {
        match transaction.kind {
            TransactionType::Income => income += transaction.amount,
            TransactionType::Expense => {
                expense += transaction.amount;
                spending_by_category
                    .entry(transaction.category.clone())
                    .and_modify(|v| *v += transaction.amount)
                    .or_insert(transaction.amount);
            }
        }
    }

    let budgets = budgets
        .iter()
        .map(|budget| {
            let spent = spending_by_category
                .get(&budget.category)
                .copied()
                .unwrap_or(0.0);
            BudgetProgress {
                budget_id: budget.id.clone(),
                category: budget.category.clone(),
                limit: budget.amount,
                spent: round_to_2_decimals(spent),
                remaining: round_to_2_decimals(budget.amount - spent),
                over: spent > budget.amount,
            }
        })
        .collect();

    for total in spending_by_category.values_mut() {
        *total = round_to_2_decimals(*total);
    }

    Summary {
        income: round_to_2_decimals(income),
        expense: round_to_2_decimals(expense),
        balance: round_to_2_decimals(income - expense),
        spending_by_category,
        budgets,
    }
}

fn round_to_2_decimals(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transaction(kind: TransactionType, amount: f64, category: &str, date: &str) -> Transaction {
        Transaction {
            id: format!("{category}-{date}"),
            user_id: "alice".into(),
            kind,
            amount,
            category: category.into(),
            date: date.into(),
            description: String::new(),
        }
    }

    fn budget(category: &str, amount: f64) -> Budget {
        Budget {
            id: format!("budget-{category}"),
            user_id: "alice".into(),
            category: category.into(),
            amount,
        }
    }

    #[test]
    fn totals_and_budget_progress() {
        let transactions = vec![
            transaction(TransactionType::Income, 2000.0, "Salary", "2026-10-01"),
            transaction(TransactionType::Expense, 120.10, "Food", "2026-10-03"),
            transaction(TransactionType::Expense, 80.25, "Food", "2026-10-09"),
            transaction(TransactionType::Expense, 700.0, "Rent", "2026-10-01"),
        ];
        let budgets = vec![budget("Food", 150.0), budget("Travel", 300.0)];

        let summary = compute_summary(&transactions, &budgets, None);
        assert_eq!(summary.income, 2000.0);
        assert_eq!(summary.expense, 900.35);
        assert_eq!(summary.balance, 1099.65);
        assert_eq!(summary.spending_by_category["Food"], 200.35);

        let food = &summary.budgets[0];
        assert!(food.over);
        assert_eq!(food.remaining, -50.35);
        let travel = &summary.budgets[1];
        assert_eq!(travel.spent, 0.0);
        assert!(!travel.over);
    }

    #[test]
    fn month_filter_uses_the_date_prefix() {
        let transactions = vec![
            transaction(TransactionType::Expense, 10.0, "Food", "2026-09-30"),
            transaction(TransactionType::Expense, 5.0, "Food", "2026-10-01T08:00:00Z"),
        ];
        let summary = compute_summary(&transactions, &[], Some("2026-10"));
        assert_eq!(summary.expense, 5.0);
    }
}
