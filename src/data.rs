//! Listing table loading and field normalization using Polars
//!
//! The raw spreadsheet carries free-text Spanish categorical fields
//! (energy label, district, floor, furniture, garage, status) alongside
//! numeric price/size/room columns and an orientation description. The
//! cleaning pass maps each of those into a fixed categorical code or flag.

use std::collections::HashMap;

use anyhow::Context;
use calamine::{open_workbook, Data, DataType, Reader, Xlsx};
use polars::prelude::*;
use rust_xlsxwriter::Workbook;

use crate::consts::{CHARACTER_FOLD, OUT_COLS};

const FULLY_FURNISHED: &str = "Totalmente amueblado y equipado";
const GARAGE_INCLUDED: &str = "Plaza de garaje incluida en el precio";
const KITCHEN_EQUIPPED: &str = "Cocina equipada y casa sin amueblar";

/// Replace Spanish accented characters with their plain ASCII equivalent
pub fn remove_spanish_chars(s: &str) -> String {
    s.chars()
        .map(|c| {
            CHARACTER_FOLD
                .iter()
                .find(|(accent, _)| *accent == c)
                .map(|(_, plain)| *plain)
                .unwrap_or(c)
        })
        .collect()
}

/// Normalize the raw energy certificate label into a fixed category
pub fn clean_energy(value: Option<&str>) -> String {
    let value = match value {
        Some(v) => v,
        None => return "unknown".to_string(),
    };

    if value.contains("indicado") {
        "not_stated".to_string()
    } else if value.contains("año") {
        "stated".to_string()
    } else if value.contains("exento") {
        "exempt".to_string()
    } else if value.contains("trámite") {
        "in_progress".to_string()
    } else {
        value.to_string()
    }
}

/// Slugify the district name: drop the "Distrito" prefix, lowercase,
/// underscores for spaces, accents folded
pub fn clean_district(value: Option<&str>) -> String {
    let value = match value {
        Some(v) => v,
        None => return "unknown".to_string(),
    };

    let slug = value.replace("Distrito", "").trim().to_lowercase().replace(' ', "_");
    remove_spanish_chars(&slug)
}

/// Bucket the floor description: numeric floors of 10 and above collapse
/// into a single "10+" bucket, named floors map to fixed codes
pub fn clean_floor(value: Option<&str>) -> String {
    let value = match value {
        Some(v) => v,
        None => return "unknown".to_string(),
    };

    if let Ok(int_val) = value.trim().parse::<i64>() {
        if int_val >= 10 {
            return "10+".to_string();
        }
        return int_val.to_string();
    }

    if value.to_lowercase().contains("chalet") {
        "chalet".to_string()
    } else if value == "Bajo" {
        "0".to_string()
    } else if value == "Semi-sótano" {
        "basement".to_string()
    } else if value == "Entreplanta" {
        "mid_floor".to_string()
    } else {
        value.to_string()
    }
}

/// True only for fully furnished listings
pub fn clean_furniture(value: Option<&str>) -> bool {
    value == Some(FULLY_FURNISHED)
}

/// True when a garage slot comes with the listing at no extra cost
pub fn clean_garage(value: Option<&str>) -> bool {
    match value {
        Some(v) => v.contains(" 0 eur/mes") || v == GARAGE_INCLUDED,
        None => false,
    }
}

/// Equipped kitchen, derived from the raw furniture description
pub fn clean_kitchen(furniture: Option<&str>) -> bool {
    matches!(furniture, Some(v) if v == FULLY_FURNISHED || v == KITCHEN_EQUIPPED)
}

/// Room count: "Sin" (studio) counts as zero rooms
pub fn clean_rooms(value: Option<&str>) -> crate::Result<i64> {
    match value {
        None => Ok(0),
        Some("Sin") => Ok(0),
        Some(v) => v
            .trim()
            .parse::<i64>()
            .with_context(|| format!("unparseable room count: {v:?}")),
    }
}

/// Normalize the second-hand condition label
pub fn clean_status(value: Option<&str>) -> String {
    match value {
        None => "unknown".to_string(),
        Some("Segunda mano/buen estado") => "second_hand_good".to_string(),
        Some("Segunda mano/para reformar") => "second_hand_bad".to_string(),
        Some(v) => v.to_string(),
    }
}

/// Derive the four cardinal flags from the orientation description.
/// Plain substring containment, so "oeste" also switches on the east flag.
pub fn orientation_flags(value: Option<&str>) -> (bool, bool, bool, bool) {
    match value {
        Some(v) => (
            v.contains("norte"),
            v.contains("este"),
            v.contains("oeste"),
            v.contains("sur"),
        ),
        None => (false, false, false, false),
    }
}

/// Load the first worksheet of an .xlsx listing file into a DataFrame.
///
/// The header row supplies column names. A column becomes Float64 when every
/// non-empty cell is numeric, otherwise it is kept as a string column.
pub fn load_listings(path: &str) -> crate::Result<DataFrame> {
    if !path.ends_with(".xlsx") {
        anyhow::bail!("the input file must be an Excel (.xlsx) file: {}", path);
    }

    let mut workbook: Xlsx<_> =
        open_workbook(path).with_context(|| format!("failed to open workbook: {path}"))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow::anyhow!("no worksheet found in {path}"))?
        .with_context(|| format!("failed to read worksheet range: {path}"))?;

    let mut rows = range.rows();
    let header: Vec<String> = rows
        .next()
        .ok_or_else(|| anyhow::anyhow!("empty worksheet in {path}"))?
        .iter()
        .map(|cell| cell.to_string().trim().to_string())
        .collect();
    let body: Vec<&[Data]> = rows.collect();

    let mut columns = Vec::with_capacity(header.len());
    for (idx, name) in header.iter().enumerate() {
        let cells: Vec<&Data> = body
            .iter()
            .map(|row| row.get(idx).unwrap_or(&Data::Empty))
            .collect();

        let numeric = cells
            .iter()
            .all(|cell| cell.is_empty() || cell.as_f64().is_some());

        let series = if numeric {
            let values: Vec<Option<f64>> = cells.iter().map(|cell| cell.as_f64()).collect();
            Series::new(name, values)
        } else {
            let values: Vec<Option<String>> = cells
                .iter()
                .map(|cell| {
                    if cell.is_empty() {
                        None
                    } else {
                        Some(cell.as_string().unwrap_or_else(|| format!("{cell}")))
                    }
                })
                .collect();
            Series::new(name, values)
        };
        columns.push(series);
    }

    let df = DataFrame::new(columns)?;
    if df.height() == 0 {
        anyhow::bail!("no listing rows found in {path}");
    }

    Ok(df)
}

/// Read a column as optional strings, rendering numeric cells as integers
/// when they carry no fractional part (Excel stores "3" as 3.0)
fn opt_str_column(df: &DataFrame, name: &str) -> crate::Result<Vec<Option<String>>> {
    let series = df
        .column(name)
        .with_context(|| format!("missing column: {name}"))?;

    let values = match series.dtype() {
        polars::prelude::DataType::String => series
            .str()?
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect(),
        _ => series
            .cast(&polars::prelude::DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| {
                v.map(|f| {
                    if f.fract() == 0.0 {
                        format!("{}", f as i64)
                    } else {
                        format!("{f}")
                    }
                })
            })
            .collect(),
    };

    Ok(values)
}

/// Read a column as optional floats, casting integers along the way
fn opt_f64_column(df: &DataFrame, name: &str) -> crate::Result<Vec<Option<f64>>> {
    let series = df
        .column(name)
        .with_context(|| format!("missing column: {name}"))?;
    Ok(series
        .cast(&polars::prelude::DataType::Float64)?
        .f64()?
        .into_iter()
        .collect())
}

/// Derive the cleaned columns from the raw listing table.
///
/// The returned frame keeps every raw column and adds the `*_clean`
/// categorical codes, the orientation flags and the derived `price_area`
/// column; use [`select_output`] to project the retained subset.
pub fn clean_listings(df: &DataFrame) -> crate::Result<DataFrame> {
    let mut df = df.clone();

    let energy = opt_str_column(&df, "energy")?;
    let energy_clean: Vec<String> = energy.iter().map(|v| clean_energy(v.as_deref())).collect();
    df.with_column(Series::new("energy_clean", energy_clean))?;

    let district = opt_str_column(&df, "district")?;
    let district_clean: Vec<String> =
        district.iter().map(|v| clean_district(v.as_deref())).collect();
    df.with_column(Series::new("district_clean", district_clean))?;

    let floor = opt_str_column(&df, "floor")?;
    let floor_clean: Vec<String> = floor.iter().map(|v| clean_floor(v.as_deref())).collect();
    df.with_column(Series::new("floor_clean", floor_clean))?;

    let garage = opt_str_column(&df, "garage")?;
    let garage_clean: Vec<bool> = garage.iter().map(|v| clean_garage(v.as_deref())).collect();
    df.with_column(Series::new("garage_clean", garage_clean))?;

    let rooms = opt_str_column(&df, "rooms")?;
    let rooms_clean: Vec<i64> = rooms
        .iter()
        .map(|v| clean_rooms(v.as_deref()))
        .collect::<crate::Result<_>>()?;
    df.with_column(Series::new("rooms_clean", rooms_clean))?;

    let status = opt_str_column(&df, "status")?;
    let status_clean: Vec<String> = status.iter().map(|v| clean_status(v.as_deref())).collect();
    df.with_column(Series::new("status_clean", status_clean))?;

    let furniture = opt_str_column(&df, "furniture")?;
    let furniture_clean: Vec<bool> =
        furniture.iter().map(|v| clean_furniture(v.as_deref())).collect();
    df.with_column(Series::new("furniture_clean", furniture_clean))?;

    let kitchen: Vec<bool> = furniture.iter().map(|v| clean_kitchen(v.as_deref())).collect();
    df.with_column(Series::new("kitchen", kitchen))?;

    let price = opt_f64_column(&df, "price")?;
    let size_const = opt_f64_column(&df, "size_const")?;
    let price_area: Vec<Option<f64>> = price
        .iter()
        .zip(size_const.iter())
        .map(|(p, s)| match (p, s) {
            (Some(p), Some(s)) if *s != 0.0 => Some(p / s),
            _ => None,
        })
        .collect();
    df.with_column(Series::new("price_area", price_area))?;

    if df.get_column_names().contains(&"size_plot") {
        let size_plot: Vec<f64> = opt_f64_column(&df, "size_plot")?
            .iter()
            .map(|v| v.unwrap_or(0.0))
            .collect();
        df.with_column(Series::new("size_plot", size_plot))?;
    }

    let orientation = opt_str_column(&df, "orientation")?;
    let mut north = Vec::with_capacity(orientation.len());
    let mut east = Vec::with_capacity(orientation.len());
    let mut west = Vec::with_capacity(orientation.len());
    let mut south = Vec::with_capacity(orientation.len());
    for value in &orientation {
        let (n, e, w, s) = orientation_flags(value.as_deref());
        north.push(n);
        east.push(e);
        west.push(w);
        south.push(s);
    }
    df.with_column(Series::new("north", north))?;
    df.with_column(Series::new("east", east))?;
    df.with_column(Series::new("west", west))?;
    df.with_column(Series::new("south", south))?;

    Ok(df)
}

/// Project the retained output columns of a cleaned frame
pub fn select_output(df: &DataFrame) -> crate::Result<DataFrame> {
    Ok(df.select(OUT_COLS)?)
}

/// Write a listing table back to an .xlsx file
pub fn write_listings(df: &DataFrame, path: &str) -> crate::Result<()> {
    if !path.ends_with(".xlsx") {
        anyhow::bail!("the output file must be an Excel (.xlsx) file: {}", path);
    }

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col, name) in df.get_column_names().iter().enumerate() {
        worksheet.write_string(0, col as u16, *name)?;
    }

    for (col, series) in df.get_columns().iter().enumerate() {
        let col = col as u16;
        match series.dtype() {
            polars::prelude::DataType::Boolean => {
                for (row, value) in series.bool()?.into_iter().enumerate() {
                    if let Some(v) = value {
                        worksheet.write_boolean(row as u32 + 1, col, v)?;
                    }
                }
            }
            polars::prelude::DataType::String => {
                for (row, value) in series.str()?.into_iter().enumerate() {
                    if let Some(v) = value {
                        worksheet.write_string(row as u32 + 1, col, v)?;
                    }
                }
            }
            _ => {
                let values = series.cast(&polars::prelude::DataType::Float64)?;
                for (row, value) in values.f64()?.into_iter().enumerate() {
                    if let Some(v) = value {
                        worksheet.write_number(row as u32 + 1, col, v)?;
                    }
                }
            }
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("failed to save workbook: {path}"))?;
    Ok(())
}

/// Row counts per category value, sorted by category
pub fn category_counts(df: &DataFrame, key: &str) -> crate::Result<DataFrame> {
    let counts = df
        .clone()
        .lazy()
        .group_by([col(key)])
        .agg([len().alias("count")])
        .sort([key], Default::default())
        .collect()?;
    Ok(counts)
}

/// Mean of a numeric column per category value
pub fn mean_by_group(df: &DataFrame, key: &str, value: &str) -> crate::Result<HashMap<String, f64>> {
    let means = df
        .clone()
        .lazy()
        .group_by([col(key)])
        .agg([col(value).mean().alias("mean")])
        .collect()?;

    let keys = means.column(key)?.str()?;
    let values = means.column("mean")?.f64()?;

    let mut out = HashMap::new();
    for (k, v) in keys.into_iter().zip(values.into_iter()) {
        if let (Some(k), Some(v)) = (k, v) {
            out.insert(k.to_string(), v);
        }
    }
    Ok(out)
}

/// Broadcast the mean `price_area` of each district back onto every row
pub fn add_avg_price_area(df: &DataFrame) -> crate::Result<DataFrame> {
    let averages = mean_by_group(df, "district_clean", "price_area")?;

    let districts = opt_str_column(df, "district_clean")?;
    let avg_col: Vec<Option<f64>> = districts
        .iter()
        .map(|d| d.as_deref().and_then(|d| averages.get(d).copied()))
        .collect();

    let mut df = df.clone();
    df.with_column(Series::new("avg_price_area", avg_col))?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_spanish_chars() {
        assert_eq!(remove_spanish_chars("Chamartín"), "Chamartin");
        assert_eq!(remove_spanish_chars("Cañada"), "Canada");
        assert_eq!(remove_spanish_chars("plain"), "plain");
    }

    #[test]
    fn test_clean_energy() {
        assert_eq!(clean_energy(Some("No indicado")), "not_stated");
        assert_eq!(clean_energy(Some("Consumo: 120 kWh/m2 año")), "stated");
        assert_eq!(clean_energy(Some("Inmueble exento")), "exempt");
        assert_eq!(clean_energy(Some("En trámite")), "in_progress");
        assert_eq!(clean_energy(Some("B")), "B");
        assert_eq!(clean_energy(None), "unknown");
    }

    #[test]
    fn test_clean_district() {
        assert_eq!(clean_district(Some("Distrito Chamartín")), "chamartin");
        assert_eq!(
            clean_district(Some("Distrito Puente de Vallecas")),
            "puente_de_vallecas"
        );
        assert_eq!(clean_district(None), "unknown");
    }

    #[test]
    fn test_clean_floor_buckets() {
        assert_eq!(clean_floor(Some("12")), "10+");
        assert_eq!(clean_floor(Some("10")), "10+");
        assert_eq!(clean_floor(Some("3")), "3");
        assert_eq!(clean_floor(Some("Bajo")), "0");
        assert_eq!(clean_floor(Some("Semi-sótano")), "basement");
        assert_eq!(clean_floor(Some("Entreplanta")), "mid_floor");
        assert_eq!(clean_floor(Some("Chalet adosado")), "chalet");
        assert_eq!(clean_floor(None), "unknown");
    }

    #[test]
    fn test_clean_furniture_and_kitchen() {
        assert!(clean_furniture(Some("Totalmente amueblado y equipado")));
        assert!(!clean_furniture(Some("Cocina equipada y casa sin amueblar")));
        assert!(!clean_furniture(None));

        assert!(clean_kitchen(Some("Totalmente amueblado y equipado")));
        assert!(clean_kitchen(Some("Cocina equipada y casa sin amueblar")));
        assert!(!clean_kitchen(Some("Cocina sin equipar y casa sin amueblar")));
        assert!(!clean_kitchen(None));
    }

    #[test]
    fn test_clean_garage() {
        assert!(clean_garage(Some("Incluida: 0 eur/mes")));
        assert!(clean_garage(Some("Plaza de garaje incluida en el precio")));
        assert!(!clean_garage(Some("Opcional: 60 eur/mes")));
        assert!(!clean_garage(None));
    }

    #[test]
    fn test_clean_rooms() {
        assert_eq!(clean_rooms(Some("Sin")).unwrap(), 0);
        assert_eq!(clean_rooms(Some("3")).unwrap(), 3);
        assert_eq!(clean_rooms(None).unwrap(), 0);
        assert!(clean_rooms(Some("tres")).is_err());
    }

    #[test]
    fn test_clean_status() {
        assert_eq!(
            clean_status(Some("Segunda mano/buen estado")),
            "second_hand_good"
        );
        assert_eq!(
            clean_status(Some("Segunda mano/para reformar")),
            "second_hand_bad"
        );
        assert_eq!(clean_status(Some("Obra nueva")), "Obra nueva");
        assert_eq!(clean_status(None), "unknown");
    }

    #[test]
    fn test_orientation_flags() {
        assert_eq!(
            orientation_flags(Some("norte y sur")),
            (true, false, false, true)
        );
        // "oeste" contains "este", so both flags switch on
        assert_eq!(
            orientation_flags(Some("oeste")),
            (false, true, true, false)
        );
        assert_eq!(orientation_flags(Some("este")), (false, true, false, false));
        assert_eq!(orientation_flags(None), (false, false, false, false));
    }

    #[test]
    fn test_load_listings_rejects_non_xlsx() {
        let result = load_listings("listings.csv");
        assert!(result.is_err());
    }

    #[test]
    fn test_mean_by_group() {
        let df = polars::df!(
            "district_clean" => &["centro", "centro", "norte"],
            "price_area" => &[10.0, 20.0, 30.0],
        )
        .unwrap();

        let means = mean_by_group(&df, "district_clean", "price_area").unwrap();
        assert_eq!(means["centro"], 15.0);
        assert_eq!(means["norte"], 30.0);
    }

    #[test]
    fn test_add_avg_price_area() {
        let df = polars::df!(
            "district_clean" => &["centro", "centro", "norte"],
            "price_area" => &[10.0, 20.0, 30.0],
        )
        .unwrap();

        let augmented = add_avg_price_area(&df).unwrap();
        let avg = augmented.column("avg_price_area").unwrap().f64().unwrap();
        assert_eq!(avg.get(0), Some(15.0));
        assert_eq!(avg.get(1), Some(15.0));
        assert_eq!(avg.get(2), Some(30.0));
    }

    #[test]
    fn test_category_counts() {
        let df = polars::df!(
            "status_clean" => &["second_hand_good", "second_hand_good", "second_hand_bad"],
        )
        .unwrap();

        let counts = category_counts(&df, "status_clean").unwrap();
        assert_eq!(counts.height(), 2);
    }
}
