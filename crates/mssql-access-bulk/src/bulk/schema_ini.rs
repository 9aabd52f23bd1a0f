//! `schema.ini` descriptor for the Access text driver.

use std::fmt;

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::error::{BulkError, Result};
use crate::schema::{ColumnSchema, ColumnType, OleDbType};

/// Rows the text driver scans to guess types; fixed since every column is typed.
const MAX_SCAN_ROWS: u32 = 25;

/// `CharacterSet` entry of a schema.ini section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CharacterSet {
    Ansi,
    Oem,
    CodePage(u32),
}

impl CharacterSet {
    /// UTF-8, the default for staged files.
    pub const UTF8: CharacterSet = CharacterSet::CodePage(65001);

    /// Code page 0 and 1 are the system ANSI and OEM pages.
    pub fn from_code_page(code_page: u32) -> Self {
        match code_page {
            0 => CharacterSet::Ansi,
            1 => CharacterSet::Oem,
            n => CharacterSet::CodePage(n),
        }
    }

    /// Encoder for staged text.
    ///
    /// `None` for ANSI and OEM, whose page depends on the host's locale, and
    /// for numeric pages without a known encoder.
    pub fn encoding(&self) -> Option<&'static Encoding> {
        match self {
            CharacterSet::CodePage(n) => code_page_encoding(*n),
            CharacterSet::Ansi | CharacterSet::Oem => None,
        }
    }

    /// Whether staged files can be written in this character set.
    /// ANSI and OEM are limited to ASCII text.
    pub fn is_supported(&self) -> bool {
        match self {
            CharacterSet::Ansi | CharacterSet::Oem => true,
            CharacterSet::CodePage(_) => self.encoding().is_some(),
        }
    }
}

fn code_page_encoding(code_page: u32) -> Option<&'static Encoding> {
    let encoding = match code_page {
        65001 => encoding_rs::UTF_8,
        866 => encoding_rs::IBM866,
        874 => encoding_rs::WINDOWS_874,
        932 => encoding_rs::SHIFT_JIS,
        936 => encoding_rs::GBK,
        949 => encoding_rs::EUC_KR,
        950 => encoding_rs::BIG5,
        1250 => encoding_rs::WINDOWS_1250,
        1251 => encoding_rs::WINDOWS_1251,
        1252 => encoding_rs::WINDOWS_1252,
        1253 => encoding_rs::WINDOWS_1253,
        1254 => encoding_rs::WINDOWS_1254,
        1255 => encoding_rs::WINDOWS_1255,
        1256 => encoding_rs::WINDOWS_1256,
        1257 => encoding_rs::WINDOWS_1257,
        1258 => encoding_rs::WINDOWS_1258,
        10000 => encoding_rs::MACINTOSH,
        20866 => encoding_rs::KOI8_R,
        20932 => encoding_rs::EUC_JP,
        21866 => encoding_rs::KOI8_U,
        28592 => encoding_rs::ISO_8859_2,
        28593 => encoding_rs::ISO_8859_3,
        28594 => encoding_rs::ISO_8859_4,
        28595 => encoding_rs::ISO_8859_5,
        28596 => encoding_rs::ISO_8859_6,
        28597 => encoding_rs::ISO_8859_7,
        28598 => encoding_rs::ISO_8859_8,
        28603 => encoding_rs::ISO_8859_13,
        28605 => encoding_rs::ISO_8859_15,
        54936 => encoding_rs::GB18030,
        _ => return None,
    };
    Some(encoding)
}

impl Default for CharacterSet {
    fn default() -> Self {
        CharacterSet::UTF8
    }
}

impl fmt::Display for CharacterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharacterSet::Ansi => f.write_str("ANSI"),
            CharacterSet::Oem => f.write_str("OEM"),
            CharacterSet::CodePage(n) => write!(f, "{}", n),
        }
    }
}

/// Text driver type for a destination column.
pub fn text_driver_type(column: &ColumnSchema) -> Result<String> {
    let unsupported = || BulkError::UnsupportedColumnType {
        column: column.full_name(),
        column_type: column.column_type.to_string(),
    };
    let ColumnType::MsAccess(t) = column.column_type else {
        return Err(unsupported());
    };

    let name = match t {
        OleDbType::Boolean => "Bit",
        OleDbType::TinyInt | OleDbType::UnsignedTinyInt => "Byte",
        OleDbType::SmallInt | OleDbType::UnsignedSmallInt => "Short",
        OleDbType::Integer
        | OleDbType::UnsignedInt
        | OleDbType::BigInt
        | OleDbType::UnsignedBigInt => "Long",
        OleDbType::Decimal | OleDbType::Numeric | OleDbType::VarNumeric => "Decimal",
        OleDbType::Currency => "Currency",
        OleDbType::Single => "Single",
        OleDbType::Double => "Double",
        OleDbType::Date | OleDbType::DBDate | OleDbType::DBTimeStamp => "DateTime",
        OleDbType::Guid => "Text",
        t if t.is_text() => {
            return Ok(if column.size == 0 {
                "Memo".to_string()
            } else {
                format!("Text Width {}", column.size)
            })
        }
        _ => return Err(unsupported()),
    };
    Ok(name.to_string())
}

/// Render the schema.ini section for `file_name`, one `ColN` entry per column.
pub fn render(
    file_name: &str,
    delimiter: char,
    character_set: CharacterSet,
    columns: &[&ColumnSchema],
) -> Result<String> {
    let mut lines = vec![
        format!("[{}]", file_name),
        format!("Format=Delimited({})", delimiter),
        format!("CharacterSet={}", character_set),
        format!("MaxScanRows={}", MAX_SCAN_ROWS),
        "ColNameHeader=False".to_string(),
        "DecimalSymbol=.".to_string(),
        "DateTimeFormat=yyyy-mm-dd hh:nn:ss".to_string(),
    ];
    for (i, column) in columns.iter().enumerate() {
        lines.push(format!("Col{n}=F{n} {}", text_driver_type(column)?, n = i + 1));
    }

    let mut ini = lines.join("\r\n");
    ini.push_str("\r\n");
    Ok(ini)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SqlDbType;

    fn col(name: &str, t: OleDbType, size: u32) -> ColumnSchema {
        let mut c = ColumnSchema::ms_access(name, t).unwrap();
        c.size = size;
        c
    }

    #[test]
    fn test_type_mapping() {
        let cases = [
            (OleDbType::Boolean, 0, "Bit"),
            (OleDbType::UnsignedTinyInt, 0, "Byte"),
            (OleDbType::SmallInt, 0, "Short"),
            (OleDbType::BigInt, 0, "Long"),
            (OleDbType::Numeric, 0, "Decimal"),
            (OleDbType::Currency, 0, "Currency"),
            (OleDbType::Single, 0, "Single"),
            (OleDbType::Double, 0, "Double"),
            (OleDbType::Date, 0, "DateTime"),
            (OleDbType::Guid, 0, "Text"),
            (OleDbType::WChar, 50, "Text Width 50"),
            (OleDbType::LongVarWChar, 0, "Memo"),
        ];
        for (t, size, expected) in cases {
            assert_eq!(text_driver_type(&col("c", t, size)).unwrap(), expected, "{:?}", t);
        }
    }

    #[test]
    fn test_unsupported_types() {
        let err = text_driver_type(&col("Photo", OleDbType::LongVarBinary, 0)).unwrap_err();
        assert!(matches!(err, BulkError::UnsupportedColumnType { ref column, .. } if column == "Photo"));

        let sql = ColumnSchema::sql_server("Id", SqlDbType::Int).unwrap();
        assert!(text_driver_type(&sql).is_err());
    }

    #[test]
    fn test_render_is_exact() {
        let id = col("Id", OleDbType::Integer, 0);
        let name = col("Name", OleDbType::WChar, 40);
        let ini = render("data.csv", ';', CharacterSet::UTF8, &[&id, &name]).unwrap();
        assert_eq!(
            ini,
            "[data.csv]\r\n\
             Format=Delimited(;)\r\n\
             CharacterSet=65001\r\n\
             MaxScanRows=25\r\n\
             ColNameHeader=False\r\n\
             DecimalSymbol=.\r\n\
             DateTimeFormat=yyyy-mm-dd hh:nn:ss\r\n\
             Col1=F1 Long\r\n\
             Col2=F2 Text Width 40\r\n"
        );
    }

    #[test]
    fn test_character_set_sentinels() {
        assert_eq!(CharacterSet::from_code_page(0).to_string(), "ANSI");
        assert_eq!(CharacterSet::from_code_page(1).to_string(), "OEM");
        assert_eq!(CharacterSet::from_code_page(1252).to_string(), "1252");
    }

    #[test]
    fn test_character_set_encoders() {
        assert_eq!(CharacterSet::UTF8.encoding(), Some(encoding_rs::UTF_8));
        assert_eq!(
            CharacterSet::from_code_page(1250).encoding(),
            Some(encoding_rs::WINDOWS_1250)
        );
        assert_eq!(CharacterSet::Ansi.encoding(), None);
        assert!(CharacterSet::Oem.is_supported());
        assert!(!CharacterSet::from_code_page(37).is_supported());
    }
}
