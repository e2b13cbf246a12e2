use crate::filter_utils::PageView;
use crate::indicators::{EmaPeriod, EmaScanResult, PriceRelation, percent_to_ema};
use chrono::DateTime;
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table,
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_BORDERS_ONLY,
};

pub fn format_number(value: Option<f64>) -> String {
    match value {
        Some(v) if !v.is_nan() => format!("{:.2}", v),
        _ => "N/A".to_string(),
    }
}

pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(v) if !v.is_nan() => format!("{}{:.2}%", if v > 0.0 { "+" } else { "" }, v),
        _ => "N/A".to_string(),
    }
}

pub fn format_timestamp(ts_ms: i64) -> String {
    if ts_ms == 0 {
        return "Never".to_string();
    }
    let seconds = ts_ms / 1000;
    let nanoseconds = (ts_ms % 1000 * 1_000_000) as u32;
    DateTime::from_timestamp(seconds, nanoseconds)
        .map(|dt| dt.format("%d-%m-%Y %H:%M:%S").to_string())
        .unwrap_or_else(|| "Unknown Time".to_string())
}

fn relation_color(relation: Option<PriceRelation>) -> Color {
    match relation {
        Some(PriceRelation::Above) => Color::Green,
        Some(PriceRelation::Below) => Color::Red,
        None => Color::DarkGrey,
    }
}

fn ema_cell(result: &EmaScanResult, period: EmaPeriod, selected: EmaPeriod) -> Cell {
    let mut cell = Cell::new(format_number(result.ema(period)))
        .fg(relation_color(result.relation(period)))
        .set_alignment(CellAlignment::Right);
    if period == selected {
        cell = cell.add_attribute(Attribute::Bold);
    }
    cell
}

/// One page of results; the selected EMA column is bold and the last column
/// is the distance from that EMA.
pub fn build_table(view: &PageView<'_>, selected: EmaPeriod) -> Table {
    let mut header = vec![
        Cell::new("#").add_attribute(Attribute::Bold),
        Cell::new("Symbol").add_attribute(Attribute::Bold),
        Cell::new("Company").add_attribute(Attribute::Bold),
        Cell::new("Price")
            .add_attribute(Attribute::Bold)
            .set_alignment(CellAlignment::Right),
    ];
    header.extend(EmaPeriod::ALL.iter().map(|p| {
        Cell::new(p.to_string())
            .add_attribute(Attribute::Bold)
            .set_alignment(CellAlignment::Right)
    }));
    header.push(
        Cell::new(format!("vs {}", selected))
            .add_attribute(Attribute::Bold)
            .set_alignment(CellAlignment::Right),
    );

    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);

    for (offset, result) in view.items.iter().enumerate() {
        let distance = percent_to_ema(result.current_price, result.ema(selected));
        let mut row = vec![
            Cell::new(view.first_ordinal + offset).fg(Color::DarkGrey),
            Cell::new(&result.symbol).fg(Color::Cyan),
            Cell::new(&result.company_name),
            Cell::new(format!("{:.2}", result.current_price)).set_alignment(CellAlignment::Right),
        ];
        row.extend(EmaPeriod::ALL.iter().map(|p| ema_cell(result, *p, selected)));
        row.push(
            Cell::new(format_percent(distance))
                .fg(relation_color(result.relation(selected)))
                .set_alignment(CellAlignment::Right),
        );
        table.add_row(row);
    }

    table
}

/// Table plus the pagination footer, ready to print.
pub fn render_page(view: &PageView<'_>, selected: EmaPeriod, title: &str) -> String {
    if view.total_items == 0 {
        return format!("\n{}\nNo results match the current filters.", title);
    }
    format!(
        "\n{}\n{}\nShowing {} - {} of {} results (page {} of {})",
        title,
        build_table(view, selected),
        view.first_ordinal,
        view.last_ordinal,
        view.total_items,
        view.page,
        view.total_pages
    )
}
