//! Dense year and month codes for the covered history window.
//!
//! Years run from [`FIRST_YEAR`] through the current year. Months run from
//! `FIRST_YEAR-FIRST_MONTH` up to, but excluding, the current month, so a
//! month that is still in progress never gets a code.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{Datelike, Utc};

use crate::common::{MONTHS_FILE, YEARS_FILE};

pub const FIRST_YEAR: i32 = 2005;
pub const FIRST_MONTH: u32 = 4;

#[derive(Debug, Clone)]
pub struct TimeIndex {
    years: Vec<String>,
    months: Vec<String>,
    year_to_index: HashMap<String, u8>,
    month_to_index: HashMap<String, u16>,
}

impl TimeIndex {
    /// Index covering everything before the current UTC month.
    pub fn now() -> Self {
        let today = Utc::now();
        Self::until(today.year(), today.month())
    }

    /// Index whose last month is the one before `(end_year, end_month)`.
    pub fn until(end_year: i32, end_month: u32) -> Self {
        let years: Vec<String> = (FIRST_YEAR..=end_year).map(|y| y.to_string()).collect();

        let mut months = Vec::new();
        let (mut year, mut month) = (FIRST_YEAR, FIRST_MONTH);
        while (year, month) < (end_year, end_month) {
            months.push(format!("{year}-{month:02}"));
            if month == 12 {
                year += 1;
                month = 1;
            } else {
                month += 1;
            }
        }

        Self::from_entries(years, months)
    }

    /// Build an index from explicit chronological lists; position = code.
    pub fn from_entries(years: Vec<String>, months: Vec<String>) -> Self {
        debug_assert!(years.len() <= u8::MAX as usize + 1);
        debug_assert!(months.len() <= u16::MAX as usize + 1);
        let year_to_index = years
            .iter()
            .enumerate()
            .map(|(i, y)| (y.clone(), i as u8))
            .collect();
        let month_to_index = months
            .iter()
            .enumerate()
            .map(|(i, m)| (m.clone(), i as u16))
            .collect();
        Self {
            years,
            months,
            year_to_index,
            month_to_index,
        }
    }

    /// Code of a `"YYYY"` key.
    pub fn year_code(&self, key: &str) -> Option<u8> {
        self.year_to_index.get(key).copied()
    }

    /// Code of a `"YYYY-MM"` key.
    pub fn month_code(&self, key: &str) -> Option<u16> {
        self.month_to_index.get(key).copied()
    }

    pub fn years(&self) -> &[String] {
        &self.years
    }

    pub fn months(&self) -> &[String] {
        &self.months
    }

    /// Write `years.txt` and `months.txt` into `dir`.
    pub fn write(&self, dir: &Path) -> io::Result<()> {
        write_lines(&dir.join(YEARS_FILE), &self.years)?;
        write_lines(&dir.join(MONTHS_FILE), &self.months)
    }

    /// Read an index previously written with [`TimeIndex::write`].
    pub fn read(dir: &Path) -> io::Result<Self> {
        let years = read_lines(&dir.join(YEARS_FILE))?;
        let months = read_lines(&dir.join(MONTHS_FILE))?;
        Ok(Self::from_entries(years, months))
    }
}

/// Write one entry per line, each newline-terminated.
pub(crate) fn write_lines<S: AsRef<str>>(path: &Path, lines: &[S]) -> io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    for line in lines {
        w.write_all(line.as_ref().as_bytes())?;
        w.write_all(b"\n")?;
    }
    w.flush()
}

/// Read a file written by [`write_lines`].
pub fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    BufReader::new(File::open(path)?).lines().collect()
}
