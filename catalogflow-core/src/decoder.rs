//! Row decoding. The header row is resolved once into a [RecordDecoder], which then turns each
//! data row into a [Record].

use std::fs::File;
use std::io;
use std::path::Path;

use csv::StringRecord;

use crate::error::{Error, Result};
use crate::record::Record;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    LanguageCode,
    Id,
    Title,
    Link,
    Price,
    Currency,
    ImageLink,
    Description,
    AdditionalImageLink,
    GoogleProductCategory,
    AvailabilityDate,
    ProductType,
    ProductCode,
    ProductCodeType,
    Condition,
    AgeGroup,
    Color,
    Gender,
    Pattern,
    Size,
    SizeType,
    SizeSystem,
    Ratings,
    IsTargetForDelete,
}

impl Column {
    pub const ALL: [Column; 24] = [
        Column::LanguageCode,
        Column::Id,
        Column::Title,
        Column::Link,
        Column::Price,
        Column::Currency,
        Column::ImageLink,
        Column::Description,
        Column::AdditionalImageLink,
        Column::GoogleProductCategory,
        Column::AvailabilityDate,
        Column::ProductType,
        Column::ProductCode,
        Column::ProductCodeType,
        Column::Condition,
        Column::AgeGroup,
        Column::Color,
        Column::Gender,
        Column::Pattern,
        Column::Size,
        Column::SizeType,
        Column::SizeSystem,
        Column::Ratings,
        Column::IsTargetForDelete,
    ];

    /// Header text as it appears in the feed.
    pub fn header(self) -> &'static str {
        match self {
            Column::LanguageCode => "Language Code",
            Column::Id => "ID",
            Column::Title => "Title",
            Column::Link => "Link",
            Column::Price => "Price",
            Column::Currency => "Currency",
            Column::ImageLink => "Image link",
            Column::Description => "Description",
            Column::AdditionalImageLink => "Additional image link",
            Column::GoogleProductCategory => "Google product category",
            Column::AvailabilityDate => "Availability date",
            Column::ProductType => "Product type",
            Column::ProductCode => "Product Code",
            Column::ProductCodeType => "Product Code type",
            Column::Condition => "Condition",
            Column::AgeGroup => "Age group",
            Column::Color => "Color",
            Column::Gender => "Gender",
            Column::Pattern => "Pattern",
            Column::Size => "Size",
            Column::SizeType => "Size type",
            Column::SizeSystem => "Size system",
            Column::Ratings => "Ratings",
            Column::IsTargetForDelete => "IsTargetForDelete",
        }
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Column positions resolved from a header row.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDecoder {
    /// Position of each entry of [Column::ALL] within a row.
    positions: Vec<usize>,
    width: usize,
}

impl RecordDecoder {
    /// Fails with a config error naming every required column the header lacks.
    pub fn from_header<I, S>(header: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = header.into_iter().map(|h| normalize(h.as_ref())).collect();

        let mut positions = Vec::with_capacity(Column::ALL.len());
        let mut missing = Vec::new();
        for column in Column::ALL {
            let wanted = normalize(column.header());
            match names.iter().position(|name| *name == wanted) {
                Some(position) => positions.push(position),
                None => missing.push(column.header()),
            }
        }

        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "feed header is missing required columns: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            positions,
            width: names.len(),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    fn position(&self, column: Column) -> usize {
        // ALL lists the variants in declaration order
        self.positions
            .get(column as usize)
            .copied()
            .unwrap_or(usize::MAX)
    }

    /// Decodes data row number `row` (1-based, header excluded).
    pub fn decode(&self, row: u64, fields: &StringRecord) -> Result<Record> {
        if fields.len() != self.width {
            let field = Column::ALL
                .iter()
                .filter(|c| self.position(**c) >= fields.len())
                .min_by_key(|c| self.position(**c))
                .map(|c| c.header().to_string())
                .unwrap_or_else(|| format!("column {}", self.width + 1));
            return Err(Error::MalformedRow {
                row,
                field,
                reason: format!("expected {} fields, found {}", self.width, fields.len()),
            });
        }

        let get = |column: Column| -> String {
            fields
                .get(self.position(column))
                .unwrap_or_default()
                .to_string()
        };

        let raw_rating = get(Column::Ratings);
        let rating = match raw_rating.trim() {
            "" => 0.0,
            value => {
                let malformed = |reason: String| Error::MalformedRow {
                    row,
                    field: Column::Ratings.header().to_string(),
                    reason,
                };
                let rating = value
                    .parse::<f64>()
                    .map_err(|e| malformed(format!("'{value}' is not a number: {e}")))?;
                // NaN and infinities have no JSON form
                if !rating.is_finite() {
                    return Err(malformed(format!("'{value}' is not a finite number")));
                }
                rating
            }
        };

        Ok(Record {
            language_code: get(Column::LanguageCode),
            id: get(Column::Id),
            title: get(Column::Title),
            link: get(Column::Link),
            price: get(Column::Price),
            currency: get(Column::Currency),
            image_link: get(Column::ImageLink),
            description: get(Column::Description),
            additional_image_link: get(Column::AdditionalImageLink),
            google_product_category: get(Column::GoogleProductCategory),
            availability_date: get(Column::AvailabilityDate),
            product_type: get(Column::ProductType),
            product_code: get(Column::ProductCode),
            product_code_type: get(Column::ProductCodeType),
            condition: get(Column::Condition),
            age_group: get(Column::AgeGroup),
            color: get(Column::Color),
            gender: get(Column::Gender),
            pattern: get(Column::Pattern),
            size: get(Column::Size),
            size_type: get(Column::SizeType),
            size_system: get(Column::SizeSystem),
            rating,
            is_target_for_delete: get(Column::IsTargetForDelete),
        })
    }
}

/// Streams decoded records out of a delimited feed. The header is read and validated when the
/// reader is built, before any data row is touched.
pub struct FeedReader<R> {
    reader: csv::Reader<R>,
    decoder: RecordDecoder,
    fields: StringRecord,
    row: u64,
}

impl FeedReader<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::Feed(format!("opening {}: {e}", path.display())))?;
        Self::new(file)
    }
}

impl<R: io::Read> FeedReader<R> {
    pub fn new(input: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(input);
        let header = reader
            .headers()
            .map_err(|e| Error::Feed(format!("reading header row: {e}")))?;
        let decoder = RecordDecoder::from_header(header)?;

        Ok(Self {
            reader,
            decoder,
            fields: StringRecord::new(),
            row: 0,
        })
    }

    pub fn decoder(&self) -> &RecordDecoder {
        &self.decoder
    }

    /// Rows consumed so far, including those that failed to decode.
    pub fn rows_read(&self) -> u64 {
        self.row
    }
}

impl<R: io::Read> Iterator for FeedReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_record(&mut self.fields) {
            Ok(false) => None,
            Ok(true) => {
                self.row += 1;
                Some(self.decoder.decode(self.row, &self.fields))
            }
            Err(e) => {
                self.row += 1;
                // a broken row (bad UTF-8 etc.) does not stop the reader
                Some(Err(Error::MalformedRow {
                    row: self.row,
                    field: "row".to_string(),
                    reason: e.to_string(),
                }))
            }
        }
    }
}
