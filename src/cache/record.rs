//! MSD filename validation and the cached record type.
//!
//! Recognized names follow `<tag>_<section>_<timestamp>[+<offset>].msd`,
//! for example `TRG_103502_20230427_021000.msd` or
//! `TRG_103502_20230427_021000+0000.msd`. The timestamp (which itself
//! contains one underscore) becomes the record's ordering key after the
//! fixed station offset is applied.

use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, TimeDelta};

use super::error::CacheError;

/// Required file extension, compared ASCII case-insensitively.
const EXTENSION: &str = "msd";

/// Timestamp layout inside the filename.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Station clocks stamp filenames in UTC; cached keys carry local time.
const UTC_OFFSET_HOURS: i64 = 8;

/// A recognized MSD data file.
///
/// The ordering key (`timestamp`) is derived from the filename at
/// validation time and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsdRecord {
    path: PathBuf,
    timestamp: NaiveDateTime,
    tag: String,
    section: String,
}

impl MsdRecord {
    /// Validate `path` against the MSD naming convention and build a record.
    ///
    /// Returns [`CacheError::UnrecognizedFilename`] when the extension or
    /// the name layout does not conform; no record is produced.
    pub fn from_path(path: &Path) -> Result<Self, CacheError> {
        let unrecognized = || CacheError::UnrecognizedFilename {
            path: path.to_path_buf(),
        };

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(unrecognized)?;
        if !extension.eq_ignore_ascii_case(EXTENSION) {
            return Err(unrecognized());
        }

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(unrecognized)?;
        // Names may carry a trailing `+<offset>`; the key ignores it.
        let stem = match stem.split_once('+') {
            Some((head, _)) => head,
            None => stem,
        };

        let mut factors = stem.splitn(3, '_');
        let tag = factors.next().filter(|s| !s.is_empty()).ok_or_else(unrecognized)?;
        let section = factors.next().filter(|s| !s.is_empty()).ok_or_else(unrecognized)?;
        let stamp = factors.next().ok_or_else(unrecognized)?;

        let parsed = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
            .map_err(|_| unrecognized())?;
        let timestamp = parsed + TimeDelta::hours(UTC_OFFSET_HOURS);

        Ok(Self {
            path: path.to_path_buf(),
            timestamp,
            tag: tag.to_string(),
            section: section.to_string(),
        })
    }

    /// Absolute path of the data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ordering key: capture time with the station offset applied.
    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Identifier of the station that produced the file.
    pub fn section(&self) -> &str {
        &self.section
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn timestamp(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_plain_name_parses_with_offset_applied() {
        let record =
            MsdRecord::from_path(Path::new("/data/TRG_103502_20230427_021000.msd")).unwrap();
        assert_eq!(record.tag(), "TRG");
        assert_eq!(record.section(), "103502");
        // 02:10:00 UTC + 8h station offset.
        assert_eq!(record.timestamp(), timestamp(2023, 4, 27, 10, 10, 0));
    }

    #[test]
    fn test_name_with_offset_suffix_parses() {
        let record =
            MsdRecord::from_path(Path::new("/data/TRG_103502_20230427_021000+0000.msd")).unwrap();
        assert_eq!(record.timestamp(), timestamp(2023, 4, 27, 10, 10, 0));
        assert_eq!(record.section(), "103502");
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        assert!(MsdRecord::from_path(Path::new("/data/TRG_103502_20230427_021000.MSD")).is_ok());
    }

    #[test]
    fn test_wrong_extension_rejected() {
        let err = MsdRecord::from_path(Path::new("/data/TRG_103502_20230427_021000.txt"))
            .unwrap_err();
        assert!(matches!(err, CacheError::UnrecognizedFilename { .. }));
    }

    #[test]
    fn test_missing_factors_rejected() {
        assert!(MsdRecord::from_path(Path::new("/data/TRG_20230427.msd")).is_err());
        assert!(MsdRecord::from_path(Path::new("/data/_103502_20230427_021000.msd")).is_err());
        assert!(MsdRecord::from_path(Path::new("/data/onlyonename.msd")).is_err());
    }

    #[test]
    fn test_malformed_timestamp_rejected() {
        assert!(MsdRecord::from_path(Path::new("/data/TRG_103502_2023_021000.msd")).is_err());
        assert!(MsdRecord::from_path(Path::new("/data/TRG_103502_20231327_021000.msd")).is_err());
    }
}
