use bson::{Bson, Document};

use crate::error::StageError;
use crate::granularity::Granularity;

/// Parsed `$bucketAuto` stage specification.
///
/// `group_by` is kept as the raw expression value (a `$`-prefixed path or an
/// expression document); evaluation happens at execution time.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketAutoSpec {
    pub group_by: Bson,
    pub buckets: i32,
    pub output: Option<Document>,
    pub granularity: Option<Granularity>,
}

impl BucketAutoSpec {
    /// Validate and parse the stage argument.
    ///
    /// Required fields are `groupBy` and `buckets`; `output` and
    /// `granularity` are optional. Unrecognized keys are rejected.
    pub fn parse(value: &Bson) -> Result<Self, StageError> {
        let doc = match value {
            Bson::Document(doc) => doc,
            other => {
                return Err(StageError::new(
                    40240,
                    format!(
                        "$bucketAuto requires an object argument, but a value of type {} was provided instead.",
                        bson_type_name(other)
                    ),
                ));
            }
        };

        let mut group_by = None;
        let mut buckets = None;
        let mut output = None;
        let mut granularity = None;

        for (key, val) in doc.iter() {
            match key.as_str() {
                "groupBy" => group_by = Some(val.clone()),
                "buckets" => buckets = Some(parse_bucket_count(val)?),
                "output" => match val {
                    Bson::Document(out) => output = Some(out.clone()),
                    other => {
                        return Err(StageError::new(
                            40244,
                            format!(
                                "The 'output' field in $bucketAuto must be an object, but a different type was provided: {}",
                                bson_type_name(other)
                            ),
                        ));
                    }
                },
                "granularity" => match val {
                    Bson::String(s) => granularity = Some(s.parse::<Granularity>()?),
                    other => {
                        return Err(StageError::new(
                            40261,
                            format!(
                                "The $bucketAuto 'granularity' field must be a string, but found type: {}",
                                bson_type_name(other)
                            ),
                        ));
                    }
                },
                other => {
                    return Err(StageError::new(
                        40245,
                        format!("Unrecognized option to $bucketAuto: {other}"),
                    ));
                }
            }
        }

        let (Some(group_by), Some(buckets)) = (group_by, buckets) else {
            return Err(StageError::new(
                40246,
                "The $bucketAuto stage must include both 'groupBy' and 'buckets' parameters.",
            ));
        };

        // groupBy must be a $-prefixed path or an expression object.
        match &group_by {
            Bson::String(s) if s.starts_with('$') => {}
            Bson::Document(_) => {}
            other => {
                return Err(StageError::new(
                    40239,
                    format!(
                        "The $bucketAuto 'groupBy' field must be specified using either a $-prefixed path or a valid expression object, but instead received: {other}"
                    ),
                ));
            }
        }

        Ok(BucketAutoSpec {
            group_by,
            buckets,
            output,
            granularity,
        })
    }
}

/// `buckets` must be a numeric value representing a positive 32-bit integer.
fn parse_bucket_count(value: &Bson) -> Result<i32, StageError> {
    let as_i32 = match value {
        Bson::Int32(n) => Some(*n),
        Bson::Int64(n) => i32::try_from(*n).ok(),
        Bson::Double(f) if f.fract() == 0.0 && *f >= i32::MIN as f64 && *f <= i32::MAX as f64 => {
            Some(*f as i32)
        }
        Bson::Double(_) => None,
        other => {
            return Err(StageError::new(
                40241,
                format!(
                    "The 'buckets' field in $bucketAuto must contain a numeric value, but a different type was detected: {}",
                    bson_type_name(other)
                ),
            ));
        }
    };

    let num = as_i32.ok_or_else(|| {
        StageError::new(
            40242,
            format!(
                "The 'buckets' setting in $bucketAuto must fit within a 32-bit integer range, but was given: {value}, type: {}",
                bson_type_name(value)
            ),
        )
    })?;

    if num <= 0 {
        return Err(StageError::new(
            40243,
            format!(
                "The 'buckets' field in the $bucketAuto operator must have a value greater than zero, but the provided value was: {num}"
            ),
        ));
    }

    Ok(num)
}

/// Human-readable BSON type name for error messages.
pub fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::JavaScriptCode(_) => "javascript",
        Bson::JavaScriptCodeWithScope(_) => "javascriptWithScope",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Timestamp(_) => "timestamp",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "date",
        Bson::Symbol(_) => "symbol",
        Bson::Decimal128(_) => "decimal",
        Bson::Undefined => "undefined",
        Bson::MaxKey => "maxKey",
        Bson::MinKey => "minKey",
        Bson::DbPointer(_) => "dbPointer",
    }
}
