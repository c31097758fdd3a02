//! Sales data extraction, cleaning and aggregation.
//!
//! Order lines are joined with their order, product, category and supplier. Lines
//! whose product has no category or supplier are dropped, as with an inner join.
//! The numeric columns are repaired before aggregation (see [`clean_sales_rows`]).

use crate::{
    entities::{Category, Order, OrderDetail, Product, Supplier, order, order_detail},
    errors::{Error, Result},
    ml::preprocessing::{
        mean, median, replace_non_positive_with_median, replace_outliers_with_median,
    },
};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use sea_orm::{QueryOrder, QuerySelect, prelude::*};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, instrument, warn};

/// Largest fraction accepted as a discount after clamping.
const MAX_DISCOUNT: f64 = 0.999_999;

/// One order line joined with its order, product, category and supplier.
#[derive(Debug, Clone, PartialEq)]
pub struct SalesRow {
    /// Product sold on this line
    pub product_id: i32,
    /// Name of the product
    pub product_name: String,
    /// Category of the product
    pub category_id: i32,
    /// Name of the category
    pub category_name: String,
    /// Supplier of the product
    pub supplier_id: i32,
    /// Company name of the supplier
    pub supplier_name: String,
    /// Ordering customer, if recorded
    pub customer_id: Option<String>,
    /// When the order was placed; missing dates are repaired before use
    pub order_date: NaiveDateTime,
    /// Units on the line, as a float so cleaning can substitute medians
    pub quantity: f64,
    /// Price per unit charged on the line
    pub unit_price: f64,
    /// Fraction taken off the line total, in `[0, 1)`
    pub discount: f64,
}

impl SalesRow {
    /// `quantity * unit_price * (1 - discount)`
    #[must_use]
    pub fn revenue(&self) -> f64 {
        self.quantity * self.unit_price * (1.0 - self.discount)
    }

    #[must_use]
    pub fn year(&self) -> i32 {
        self.order_date.year()
    }

    #[must_use]
    pub fn month(&self) -> u32 {
        self.order_date.month()
    }
}

/// Counts of values repaired by [`clean_sales_rows`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleaningReport {
    /// Quantities and prices `<= 0` replaced by the median
    pub non_positive: usize,
    /// Values beyond three standard deviations replaced by the median
    pub outliers: usize,
    /// Discounts moved into `[0, 1)`
    pub clamped_discounts: usize,
    /// Order dates outside `[1990-01-01, now]` replaced by the median date
    pub invalid_dates: usize,
}

impl CleaningReport {
    /// Whether anything was changed.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.non_positive == 0
            && self.outliers == 0
            && self.clamped_discounts == 0
            && self.invalid_dates == 0
    }
}

/// Aggregated sales of one product in one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySales {
    /// Product the month belongs to
    pub product_id: i32,
    /// Name of the product
    pub product_name: String,
    /// Category of the product
    pub category_id: i32,
    /// Name of the category
    pub category_name: String,
    /// Supplier of the product
    pub supplier_id: i32,
    /// Company name of the supplier
    pub supplier_name: String,
    /// Calendar year
    pub year: i32,
    /// Calendar month, 1-12
    pub month: u32,
    /// Sum of cleaned quantities
    pub total_quantity: f64,
    /// Sum of line revenues
    pub total_revenue: f64,
    /// Mean unit price over the month's lines
    pub avg_price: f64,
}

/// Sales totals of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category_id: i32,
    pub category_name: String,
    /// Distinct products of the category that sold at least once
    pub product_count: usize,
    /// Units sold across all lines
    pub total_quantity: i64,
    /// Discounted revenue across all lines
    pub total_revenue: f64,
}

/// Sales totals of one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopSellingProduct {
    pub product_id: i32,
    pub product_name: String,
    pub category_name: String,
    /// Units sold, the ranking key
    pub total_quantity: i64,
    /// Discounted revenue
    pub total_revenue: f64,
}

/// Mean quantity and revenue over all order lines of one product.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SalesAverages {
    /// Mean units per line
    pub avg_quantity: f64,
    /// Mean charged unit price
    pub avg_unit_price: f64,
    /// Mean discounted line revenue
    pub avg_revenue: f64,
}

/// Filters accepted by the sales summary endpoint.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SalesSummaryQuery {
    /// Restrict to one year
    pub year: Option<i32>,
    /// Restrict to one calendar month, in every year unless `year` is set
    pub month: Option<u32>,
    pub product_id: Option<i32>,
    pub category_id: Option<i32>,
}

/// First and last instant of a month, or of the whole year when `month` is `None`.
///
/// # Errors
/// Returns a validation error for a month outside 1..=12 or an unrepresentable year.
pub fn month_window(year: i32, month: Option<u32>) -> Result<(NaiveDateTime, NaiveDateTime)> {
    let (first_month, last_month) = match month {
        Some(m) if (1..=12).contains(&m) => (m, m),
        Some(m) => {
            return Err(Error::Validation {
                message: format!("month must be between 1 and 12, got {m}"),
            });
        }
        None => (1, 12),
    };

    let invalid = || Error::Validation {
        message: format!("invalid year {year}"),
    };
    let start = NaiveDate::from_ymd_opt(year, first_month, 1).ok_or_else(invalid)?;
    let next_month_start = if last_month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, last_month + 1, 1)
    }
    .ok_or_else(invalid)?;
    let end = next_month_start.pred_opt().ok_or_else(invalid)?;

    Ok((
        start.and_hms_opt(0, 0, 0).ok_or_else(invalid)?,
        end.and_hms_opt(23, 59, 59).ok_or_else(invalid)?,
    ))
}

/// Repairs extracted sales rows in place.
///
/// - `quantity` and `unit_price`: values `<= 0` become the column median, then
///   values with `|x - mean| > 3 * std` become the median.
/// - `discount`: clamped into `[0, 1)`, then the same outlier rule.
/// - `order_date`: dates before 1990-01-01 or after `now` become the median of the
///   valid dates.
pub fn clean_sales_rows(rows: &mut [SalesRow], now: NaiveDateTime) -> CleaningReport {
    let mut report = CleaningReport::default();
    if rows.is_empty() {
        return report;
    }

    let mut quantities: Vec<f64> = rows.iter().map(|r| r.quantity).collect();
    report.non_positive += replace_non_positive_with_median(&mut quantities);
    report.outliers += replace_outliers_with_median(&mut quantities);

    let mut prices: Vec<f64> = rows.iter().map(|r| r.unit_price).collect();
    report.non_positive += replace_non_positive_with_median(&mut prices);
    report.outliers += replace_outliers_with_median(&mut prices);

    let mut discounts: Vec<f64> = rows
        .iter()
        .map(|r| {
            if (0.0..=MAX_DISCOUNT).contains(&r.discount) {
                return r.discount;
            }
            report.clamped_discounts += 1;
            if r.discount.is_finite() {
                r.discount.clamp(0.0, MAX_DISCOUNT)
            } else {
                0.0
            }
        })
        .collect();
    report.outliers += replace_outliers_with_median(&mut discounts);

    for (row, ((quantity, price), discount)) in rows
        .iter_mut()
        .zip(quantities.into_iter().zip(prices).zip(discounts))
    {
        row.quantity = quantity;
        row.unit_price = price;
        row.discount = discount;
    }

    report.invalid_dates = repair_order_dates(rows, now);
    report
}

fn repair_order_dates(rows: &mut [SalesRow], now: NaiveDateTime) -> usize {
    let Some(earliest) = NaiveDate::from_ymd_opt(1990, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
    else {
        return 0;
    };
    let is_valid = |date: &NaiveDateTime| *date >= earliest && *date <= now;

    #[allow(clippy::cast_precision_loss)]
    let valid: Vec<f64> = rows
        .iter()
        .filter(|r| is_valid(&r.order_date))
        .map(|r| r.order_date.and_utc().timestamp() as f64)
        .collect();
    if valid.len() == rows.len() {
        return 0;
    }

    #[allow(clippy::cast_possible_truncation)]
    let replacement = median(&valid)
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs.round() as i64, 0))
        .map(|dt| dt.naive_utc());
    let Some(replacement) = replacement else {
        warn!("All order dates are out of range; leaving them unchanged");
        return 0;
    };

    let mut replaced = 0;
    for row in rows.iter_mut().filter(|r| !is_valid(&r.order_date)) {
        row.order_date = replacement;
        replaced += 1;
    }
    replaced
}

/// Loads and cleans the sales rows of orders dated within `[start, end]`.
///
/// Orders without a date are skipped; either bound may be open.
///
/// # Errors
/// Returns an error if a database query fails.
#[instrument(skip(db))]
pub async fn load_sales_rows(
    db: &DatabaseConnection,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> Result<Vec<SalesRow>> {
    let mut query = OrderDetail::find()
        .find_also_related(Order)
        .filter(order::Column::OrderDate.is_not_null());
    if let Some(start) = start {
        query = query.filter(order::Column::OrderDate.gte(start));
    }
    if let Some(end) = end {
        query = query.filter(order::Column::OrderDate.lte(end));
    }
    let lines = query
        .order_by_asc(order_detail::Column::OrderId)
        .order_by_asc(order_detail::Column::ProductId)
        .all(db)
        .await?;

    let products: HashMap<i32, _> = Product::find()
        .all(db)
        .await?
        .into_iter()
        .map(|p| (p.product_id, p))
        .collect();
    let categories: HashMap<i32, String> = Category::find()
        .all(db)
        .await?
        .into_iter()
        .map(|c| (c.category_id, c.category_name))
        .collect();
    let suppliers: HashMap<i32, String> = Supplier::find()
        .all(db)
        .await?
        .into_iter()
        .map(|s| (s.supplier_id, s.company_name))
        .collect();

    let raw_count = lines.len();
    let mut rows: Vec<SalesRow> = lines
        .into_iter()
        .filter_map(|(line, order)| {
            let order = order?;
            let order_date = order.order_date?;
            let product = products.get(&line.product_id)?;
            let category_id = product.category_id?;
            let supplier_id = product.supplier_id?;
            Some(SalesRow {
                product_id: product.product_id,
                product_name: product.product_name.clone(),
                category_id,
                category_name: categories.get(&category_id)?.clone(),
                supplier_id,
                supplier_name: suppliers.get(&supplier_id)?.clone(),
                customer_id: order.customer_id,
                order_date,
                quantity: f64::from(line.quantity),
                unit_price: line.unit_price,
                discount: line.discount,
            })
        })
        .collect();

    debug!(
        "Extracted {} sales rows ({} lines without category or supplier dropped)",
        rows.len(),
        raw_count - rows.len()
    );

    let report = clean_sales_rows(&mut rows, Utc::now().naive_utc());
    if !report.is_clean() {
        warn!(?report, "Repaired sales data");
    }
    Ok(rows)
}

/// Groups cleaned rows by product and calendar month.
///
/// Rows come out ordered by product, year and month.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn summarize_monthly(rows: &[SalesRow]) -> Vec<MonthlySales> {
    struct Bucket<'a> {
        first: &'a SalesRow,
        quantity: f64,
        revenue: f64,
        price_sum: f64,
        lines: usize,
    }

    let mut buckets: BTreeMap<(i32, i32, i32, i32, u32), Bucket<'_>> = BTreeMap::new();
    for row in rows {
        let key = (
            row.product_id,
            row.category_id,
            row.supplier_id,
            row.year(),
            row.month(),
        );
        let bucket = buckets.entry(key).or_insert(Bucket {
            first: row,
            quantity: 0.0,
            revenue: 0.0,
            price_sum: 0.0,
            lines: 0,
        });
        bucket.quantity += row.quantity;
        bucket.revenue += row.revenue();
        bucket.price_sum += row.unit_price;
        bucket.lines += 1;
    }

    buckets
        .into_iter()
        .map(|((_, _, _, year, month), bucket)| MonthlySales {
            product_id: bucket.first.product_id,
            product_name: bucket.first.product_name.clone(),
            category_id: bucket.first.category_id,
            category_name: bucket.first.category_name.clone(),
            supplier_id: bucket.first.supplier_id,
            supplier_name: bucket.first.supplier_name.clone(),
            year,
            month,
            total_quantity: bucket.quantity,
            total_revenue: bucket.revenue,
            avg_price: bucket.price_sum / bucket.lines as f64,
        })
        .collect()
}

/// Monthly sales per product for orders within `[start, end]`.
///
/// # Errors
/// Returns an error if a database query fails.
pub async fn monthly_sales_summary(
    db: &DatabaseConnection,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> Result<Vec<MonthlySales>> {
    let rows = load_sales_rows(db, start, end).await?;
    let summary = summarize_monthly(&rows);
    debug!("Aggregated {} rows into {} product-months", rows.len(), summary.len());
    Ok(summary)
}

/// Monthly summary narrowed by the endpoint filters.
///
/// `year` with `month` selects that month, `year` alone the calendar year and
/// `month` alone that month in every year.
///
/// # Errors
/// Returns [`Error::NoSalesData`] when nothing matches and a validation error for
/// an out-of-range month.
#[instrument(skip(db))]
pub async fn sales_summary(
    db: &DatabaseConnection,
    query: SalesSummaryQuery,
) -> Result<Vec<MonthlySales>> {
    if let Some(month) = query.month {
        if !(1..=12).contains(&month) {
            return Err(Error::Validation {
                message: format!("month must be between 1 and 12, got {month}"),
            });
        }
    }

    let (start, end) = match query.year {
        Some(year) => {
            let (start, end) = month_window(year, query.month)?;
            (Some(start), Some(end))
        }
        None => (None, None),
    };

    let summary = monthly_sales_summary(db, start, end).await?;
    if summary.is_empty() {
        return Err(Error::NoSalesData {
            message: "No sales data found".to_string(),
        });
    }

    let filtered: Vec<MonthlySales> = summary
        .into_iter()
        .filter(|row| query.product_id.is_none_or(|id| row.product_id == id))
        .filter(|row| query.category_id.is_none_or(|id| row.category_id == id))
        .filter(|row| query.month.is_none_or(|m| row.month == m))
        .collect();
    if filtered.is_empty() {
        return Err(Error::NoSalesData {
            message: "No sales data found for the given filters".to_string(),
        });
    }
    Ok(filtered)
}

/// Order lines that belong to an existing order.
async fn ordered_lines(db: &DatabaseConnection) -> Result<Vec<order_detail::Model>> {
    OrderDetail::find()
        .inner_join(Order)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Per-category totals over the raw order lines, highest revenue first.
///
/// # Errors
/// Returns an error if a database query fails.
#[instrument(skip(db))]
pub async fn category_summary(db: &DatabaseConnection) -> Result<Vec<CategorySummary>> {
    let products: HashMap<i32, Option<i32>> = Product::find()
        .all(db)
        .await?
        .into_iter()
        .map(|p| (p.product_id, p.category_id))
        .collect();
    let categories: HashMap<i32, String> = Category::find()
        .all(db)
        .await?
        .into_iter()
        .map(|c| (c.category_id, c.category_name))
        .collect();

    let mut totals: BTreeMap<i32, (Vec<i32>, i64, f64)> = BTreeMap::new();
    for line in ordered_lines(db).await? {
        let Some(Some(category_id)) = products.get(&line.product_id) else {
            continue;
        };
        if !categories.contains_key(category_id) {
            continue;
        }
        let entry = totals.entry(*category_id).or_default();
        if !entry.0.contains(&line.product_id) {
            entry.0.push(line.product_id);
        }
        entry.1 += i64::from(line.quantity);
        entry.2 += line_revenue(&line);
    }

    let mut summary: Vec<CategorySummary> = totals
        .into_iter()
        .filter_map(|(category_id, (products, quantity, revenue))| {
            Some(CategorySummary {
                category_id,
                category_name: categories.get(&category_id)?.clone(),
                product_count: products.len(),
                total_quantity: quantity,
                total_revenue: revenue,
            })
        })
        .collect();
    summary.sort_by(|a, b| {
        b.total_revenue
            .total_cmp(&a.total_revenue)
            .then(a.category_id.cmp(&b.category_id))
    });
    Ok(summary)
}

/// Best sellers by total quantity, at most `limit` products.
///
/// Products without a category are not ranked.
///
/// # Errors
/// Returns an error if a database query fails.
#[instrument(skip(db))]
pub async fn top_selling_products(
    db: &DatabaseConnection,
    limit: usize,
) -> Result<Vec<TopSellingProduct>> {
    let categories: HashMap<i32, String> = Category::find()
        .all(db)
        .await?
        .into_iter()
        .map(|c| (c.category_id, c.category_name))
        .collect();
    let products: HashMap<i32, (String, String)> = Product::find()
        .all(db)
        .await?
        .into_iter()
        .filter_map(|p| {
            let category_name = categories.get(&p.category_id?)?.clone();
            Some((p.product_id, (p.product_name, category_name)))
        })
        .collect();

    let mut totals: HashMap<i32, (i64, f64)> = HashMap::new();
    for line in ordered_lines(db).await? {
        if products.contains_key(&line.product_id) {
            let entry = totals.entry(line.product_id).or_default();
            entry.0 += i64::from(line.quantity);
            entry.1 += line_revenue(&line);
        }
    }

    let mut ranking: Vec<TopSellingProduct> = totals
        .into_iter()
        .filter_map(|(product_id, (quantity, revenue))| {
            let (product_name, category_name) = products.get(&product_id)?.clone();
            Some(TopSellingProduct {
                product_id,
                product_name,
                category_name,
                total_quantity: quantity,
                total_revenue: revenue,
            })
        })
        .collect();
    ranking.sort_by(|a, b| {
        b.total_quantity
            .cmp(&a.total_quantity)
            .then(a.product_id.cmp(&b.product_id))
    });
    ranking.truncate(limit);
    info!("Ranked {} top selling products", ranking.len());
    Ok(ranking)
}

/// Average quantity and revenue per order line of a product, `None` if it never sold.
///
/// # Errors
/// Returns an error if a database query fails.
pub async fn product_sales_averages(
    db: &DatabaseConnection,
    product_id: i32,
) -> Result<Option<SalesAverages>> {
    let lines: Vec<order_detail::Model> = OrderDetail::find()
        .inner_join(Order)
        .filter(order_detail::Column::ProductId.eq(product_id))
        .all(db)
        .await?;

    let quantities: Vec<f64> = lines.iter().map(|l| f64::from(l.quantity)).collect();
    let prices: Vec<f64> = lines.iter().map(|l| l.unit_price).collect();
    let revenues: Vec<f64> = lines.iter().map(line_revenue).collect();
    let (Some(avg_quantity), Some(avg_unit_price), Some(avg_revenue)) =
        (mean(&quantities), mean(&prices), mean(&revenues))
    else {
        return Ok(None);
    };
    Ok(Some(SalesAverages {
        avg_quantity,
        avg_unit_price,
        avg_revenue,
    }))
}

fn line_revenue(line: &order_detail::Model) -> f64 {
    f64::from(line.quantity) * line.unit_price * (1.0 - line.discount)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;

    fn row(quantity: f64, unit_price: f64, discount: f64, date: NaiveDateTime) -> SalesRow {
        SalesRow {
            product_id: 1,
            product_name: "Chai".to_string(),
            category_id: 1,
            category_name: "Beverages".to_string(),
            supplier_id: 1,
            supplier_name: "Exotic Liquids".to_string(),
            customer_id: None,
            order_date: date,
            quantity,
            unit_price,
            discount,
        }
    }

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_month_window() {
        let (start, end) = month_window(1997, Some(2)).unwrap();
        assert_eq!(start, at(1997, 2, 1));
        assert_eq!(
            end,
            NaiveDate::from_ymd_opt(1997, 2, 28)
                .unwrap()
                .and_hms_opt(23, 59, 59)
                .unwrap()
        );

        let (start, end) = month_window(1996, Some(12)).unwrap();
        assert_eq!(start, at(1996, 12, 1));
        assert_eq!(end.date(), NaiveDate::from_ymd_opt(1996, 12, 31).unwrap());

        let (start, end) = month_window(1998, None).unwrap();
        assert_eq!(start, at(1998, 1, 1));
        assert_eq!(end.date(), NaiveDate::from_ymd_opt(1998, 12, 31).unwrap());

        assert!(matches!(
            month_window(1998, Some(13)),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_clean_replaces_non_positive_and_clamps_discount() {
        let now = at(2024, 1, 1);
        let mut rows = vec![
            row(0.0, 10.0, 0.0, at(1997, 1, 1)),
            row(4.0, -5.0, 1.5, at(1997, 1, 2)),
            row(6.0, 12.0, -0.2, at(1997, 1, 3)),
            row(8.0, 14.0, 0.1, at(1997, 1, 4)),
        ];

        let report = clean_sales_rows(&mut rows, now);

        // medians: quantity of [0, 4, 6, 8] is 5; price of [10, -5, 12, 14] is 11
        assert_eq!(rows[0].quantity, 5.0);
        assert_eq!(rows[1].unit_price, 11.0);
        assert_eq!(report.non_positive, 2);
        assert_eq!(report.clamped_discounts, 2);
        assert!(rows.iter().all(|r| (0.0..1.0).contains(&r.discount)));
        assert_eq!(report.invalid_dates, 0);
    }

    #[test]
    fn test_clean_repairs_dates_out_of_range() {
        let now = at(2024, 1, 1);
        let mut rows = vec![
            row(5.0, 10.0, 0.0, at(1997, 1, 1)),
            row(5.0, 10.0, 0.0, at(1997, 1, 3)),
            row(5.0, 10.0, 0.0, at(1997, 1, 5)),
            row(5.0, 10.0, 0.0, at(1985, 6, 1)),
            row(5.0, 10.0, 0.0, at(2030, 6, 1)),
        ];

        let report = clean_sales_rows(&mut rows, now);

        assert_eq!(report.invalid_dates, 2);
        assert_eq!(rows[3].order_date, at(1997, 1, 3));
        assert_eq!(rows[4].order_date, at(1997, 1, 3));
        assert!(report.outliers == 0 && report.non_positive == 0);
    }

    #[test]
    fn test_clean_replaces_quantity_outlier() {
        let now = at(2024, 1, 1);
        let mut rows: Vec<SalesRow> = (0..20)
            .map(|i| row(10.0 + f64::from(i % 3), 10.0, 0.0, at(1997, 1, 1)))
            .collect();
        rows.push(row(900.0, 10.0, 0.0, at(1997, 1, 1)));

        let report = clean_sales_rows(&mut rows, now);

        assert_eq!(report.outliers, 1);
        assert_eq!(rows[20].quantity, 11.0);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_summarize_monthly_groups_by_product_and_month() {
        let mut rows = vec![
            row(2.0, 10.0, 0.0, at(1997, 1, 1)),
            row(3.0, 20.0, 0.5, at(1997, 1, 20)),
            row(4.0, 10.0, 0.0, at(1997, 2, 1)),
        ];
        rows[2].product_id = 2;

        let summary = summarize_monthly(&rows);

        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].product_id, 1);
        assert_eq!(summary[0].total_quantity, 5.0);
        assert_eq!(summary[0].total_revenue, 2.0 * 10.0 + 3.0 * 20.0 * 0.5);
        assert_eq!(summary[0].avg_price, 15.0);
        assert_eq!((summary[1].year, summary[1].month), (1997, 2));
    }

    #[tokio::test]
    async fn test_load_sales_rows_drops_uncategorised_products() -> Result<()> {
        let db = setup_seeded_db().await?;

        let rows = load_sales_rows(&db, None, None).await?;
        assert_eq!(rows.len(), 5 * SAMPLE_ORDER_COUNT);
        assert!(rows.iter().all(|r| r.product_id != UNCATEGORISED_PRODUCT_ID));

        let (start, end) = month_window(1997, Some(3))?;
        let march = load_sales_rows(&db, Some(start), Some(end)).await?;
        assert_eq!(march.len(), 5);
        assert!(march.iter().all(|r| r.month() == 3 && r.year() == 1997));
        Ok(())
    }

    #[tokio::test]
    async fn test_sales_summary_filters() -> Result<()> {
        let db = setup_seeded_db().await?;

        let all = sales_summary(&db, SalesSummaryQuery::default()).await?;
        assert_eq!(all.len(), 5 * SAMPLE_ORDER_COUNT);

        let chai_march = sales_summary(
            &db,
            SalesSummaryQuery {
                year: Some(1997),
                month: Some(3),
                product_id: Some(1),
                category_id: None,
            },
        )
        .await?;
        assert_eq!(chai_march.len(), 1);
        assert_eq!(chai_march[0].total_quantity, 17.0);
        assert!((chai_march[0].total_revenue - 290.7).abs() < 1e-9);
        assert_eq!(chai_march[0].category_name, "Beverages");

        let condiments = sales_summary(
            &db,
            SalesSummaryQuery {
                category_id: Some(2),
                ..SalesSummaryQuery::default()
            },
        )
        .await?;
        assert!(condiments.iter().all(|r| r.category_id == 2));
        assert_eq!(condiments.len(), 3 * SAMPLE_ORDER_COUNT);

        let month_only = sales_summary(
            &db,
            SalesSummaryQuery {
                month: Some(5),
                ..SalesSummaryQuery::default()
            },
        )
        .await?;
        assert_eq!(month_only.len(), 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_sales_summary_not_found() -> Result<()> {
        let db = setup_seeded_db().await?;

        let other_year = SalesSummaryQuery {
            year: Some(2003),
            ..SalesSummaryQuery::default()
        };
        assert!(matches!(
            sales_summary(&db, other_year).await.unwrap_err(),
            Error::NoSalesData { .. }
        ));

        let unsold = SalesSummaryQuery {
            product_id: Some(6),
            ..SalesSummaryQuery::default()
        };
        assert!(matches!(
            sales_summary(&db, unsold).await.unwrap_err(),
            Error::NoSalesData { .. }
        ));

        let bad_month = SalesSummaryQuery {
            month: Some(0),
            ..SalesSummaryQuery::default()
        };
        assert!(matches!(
            sales_summary(&db, bad_month).await.unwrap_err(),
            Error::Validation { .. }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_category_summary() -> Result<()> {
        let db = setup_seeded_db().await?;

        let summary = category_summary(&db).await?;

        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].category_id, 2);
        assert_eq!(summary[0].product_count, 3);
        assert_eq!(summary[0].total_quantity, 661);
        assert!((summary[0].total_revenue - 11_527.6275).abs() < 1e-6);
        assert_eq!(summary[1].category_name, "Beverages");
        assert_eq!(summary[1].total_quantity, 425);
        Ok(())
    }

    #[tokio::test]
    async fn test_top_selling_products() -> Result<()> {
        let db = setup_seeded_db().await?;

        let top = top_selling_products(&db, 3).await?;
        assert_eq!(
            top.iter().map(|p| p.product_id).collect::<Vec<_>>(),
            vec![4, 3, 2]
        );
        assert_eq!(top[0].total_quantity, 226);
        assert_eq!(top[0].category_name, "Condiments");

        let all = top_selling_products(&db, 50).await?;
        assert_eq!(all.len(), 5);
        assert!(all.iter().all(|p| p.product_id != UNCATEGORISED_PRODUCT_ID));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_database_aggregates() -> Result<()> {
        let db = setup_test_db().await?;
        assert!(category_summary(&db).await?.is_empty());
        assert!(top_selling_products(&db, 10).await?.is_empty());
        assert!(matches!(
            sales_summary(&db, SalesSummaryQuery::default()).await.unwrap_err(),
            Error::NoSalesData { .. }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_product_sales_averages() -> Result<()> {
        let db = setup_seeded_db().await?;

        let chai = product_sales_averages(&db, 1).await?.unwrap();
        assert!((chai.avg_quantity - 203.0 / 12.0).abs() < 1e-9);
        assert!((chai.avg_revenue - 3591.0 / 12.0).abs() < 1e-9);
        assert_eq!(chai.avg_unit_price, 18.0);

        assert!(product_sales_averages(&db, 6).await?.is_none());
        Ok(())
    }
}
