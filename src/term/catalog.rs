use std::fmt;

/// How an operation consumes the `args` element of its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumption {
    /// No operands, a direct call into a store constructor.
    Nullary,
    /// Root constructor, every argument is evaluated and handed to the store.
    Constructor,
    /// Exactly `min..=max` operands, the first one is the receiver.
    Fixed,
    /// Receiver followed by a left-to-right parameter list.
    Variadic,
    /// Receiver, positional keys and an optional-parameters mapping.
    Keyed,
    /// Handled by a dedicated evaluator routine.
    Special,
    /// Recognized but never dispatched.
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationDescriptor {
    pub term_type: TermType,
    pub name: &'static str,
    pub method: &'static str,
    pub min_args: usize,
    pub max_args: Option<usize>,
    pub consumption: Consumption,
}

impl OperationDescriptor {
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.map_or(true, |max| count <= max)
    }

    pub fn takes_options(&self) -> bool {
        matches!(self.consumption, Consumption::Keyed | Consumption::Constructor | Consumption::Special)
    }
}

macro_rules! max_arity {
    (*) => { None };
    ($n:literal) => { Some($n) };
}

macro_rules! term_types {
    ($( $variant:ident = $code:literal, $name:literal, $method:literal, $min:literal..$max:tt, $consumption:ident; )*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum TermType {
            $( $variant = $code, )*
        }

        impl TermType {
            pub const ALL: &'static [TermType] = &[ $( TermType::$variant, )* ];

            pub fn from_code(code: u64) -> Option<TermType> {
                match code {
                    $( $code => Some(TermType::$variant), )*
                    _ => None,
                }
            }

            pub fn descriptor(self) -> OperationDescriptor {
                match self {
                    $( TermType::$variant => OperationDescriptor {
                        term_type: self,
                        name: $name,
                        method: $method,
                        min_args: $min,
                        max_args: max_arity!($max),
                        consumption: Consumption::$consumption,
                    }, )*
                }
            }
        }
    };
}

term_types! {
    // values and variables
    Datum = 1, "DATUM", "expr", 0..1, Special;
    MakeArray = 2, "MAKE_ARRAY", "expr", 0..*, Special;
    MakeObj = 3, "MAKE_OBJ", "expr", 0..0, Special;
    Var = 10, "VAR", "var", 1..1, Special;
    ImplicitVar = 13, "IMPLICIT_VAR", "row", 0..0, Special;
    Func = 69, "FUNC", "func", 2..2, Special;
    Funcall = 64, "FUNCALL", "do", 1..*, Special;

    // data-source selection
    Db = 14, "DB", "db", 1..1, Special;
    Table = 15, "TABLE", "table", 1..2, Special;
    Get = 16, "GET", "get", 2..2, Fixed;
    GetAll = 78, "GET_ALL", "getAll", 1..*, Keyed;
    Between = 182, "BETWEEN", "between", 3..3, Keyed;
    BetweenDeprecated = 36, "BETWEEN_DEPRECATED", "between", 3..3, Keyed;
    Info = 79, "INFO", "info", 1..1, Fixed;

    // sequence transformation
    Filter = 39, "FILTER", "filter", 2..2, Keyed;
    Map = 38, "MAP", "map", 2..*, Variadic;
    ConcatMap = 40, "CONCAT_MAP", "concatMap", 2..2, Fixed;
    OrderBy = 41, "ORDER_BY", "orderBy", 1..*, Keyed;
    Asc = 73, "ASC", "asc", 1..1, Constructor;
    Desc = 74, "DESC", "desc", 1..1, Constructor;
    Skip = 70, "SKIP", "skip", 2..2, Fixed;
    Limit = 71, "LIMIT", "limit", 2..2, Fixed;
    Slice = 30, "SLICE", "slice", 2..3, Keyed;
    Nth = 45, "NTH", "nth", 2..2, Fixed;
    OffsetsOf = 87, "OFFSETS_OF", "offsetsOf", 2..2, Fixed;
    IsEmpty = 86, "IS_EMPTY", "isEmpty", 1..1, Fixed;
    Union = 44, "UNION", "union", 1..*, Variadic;
    Sample = 81, "SAMPLE", "sample", 2..2, Fixed;
    ForEach = 68, "FOR_EACH", "forEach", 2..2, Fixed;
    WithFields = 96, "WITH_FIELDS", "withFields", 1..*, Variadic;

    // aggregation
    Reduce = 37, "REDUCE", "reduce", 2..2, Fixed;
    Fold = 187, "FOLD", "fold", 3..3, Keyed;
    Count = 43, "COUNT", "count", 1..2, Fixed;
    Sum = 145, "SUM", "sum", 1..2, Fixed;
    Avg = 146, "AVG", "avg", 1..2, Fixed;
    Min = 147, "MIN", "min", 1..2, Keyed;
    Max = 148, "MAX", "max", 1..2, Keyed;
    Distinct = 42, "DISTINCT", "distinct", 1..1, Keyed;
    Group = 144, "GROUP", "group", 1..*, Keyed;
    Ungroup = 150, "UNGROUP", "ungroup", 1..1, Fixed;
    Contains = 93, "CONTAINS", "contains", 1..*, Variadic;

    // document manipulation
    Pluck = 33, "PLUCK", "pluck", 1..*, Variadic;
    Without = 34, "WITHOUT", "without", 1..*, Variadic;
    Merge = 35, "MERGE", "merge", 1..*, Variadic;
    Append = 29, "APPEND", "append", 2..2, Fixed;
    Prepend = 80, "PREPEND", "prepend", 2..2, Fixed;
    Difference = 95, "DIFFERENCE", "difference", 2..2, Fixed;
    SetInsert = 88, "SET_INSERT", "setInsert", 2..2, Fixed;
    SetIntersection = 89, "SET_INTERSECTION", "setIntersection", 2..2, Fixed;
    SetUnion = 90, "SET_UNION", "setUnion", 2..2, Fixed;
    SetDifference = 91, "SET_DIFFERENCE", "setDifference", 2..2, Fixed;
    GetField = 31, "GET_FIELD", "getField", 2..2, Fixed;
    Bracket = 170, "BRACKET", "bracket", 2..2, Fixed;
    HasFields = 32, "HAS_FIELDS", "hasFields", 1..*, Variadic;
    InsertAt = 82, "INSERT_AT", "insertAt", 3..3, Fixed;
    DeleteAt = 83, "DELETE_AT", "deleteAt", 2..3, Fixed;
    ChangeAt = 84, "CHANGE_AT", "changeAt", 3..3, Fixed;
    SpliceAt = 85, "SPLICE_AT", "spliceAt", 3..3, Fixed;
    Keys = 94, "KEYS", "keys", 1..1, Fixed;
    Values = 186, "VALUES", "values", 1..1, Fixed;
    Literal = 137, "LITERAL", "literal", 0..1, Constructor;
    Object = 143, "OBJECT", "object", 0..*, Constructor;

    // writes
    Insert = 56, "INSERT", "insert", 2..2, Keyed;
    Update = 53, "UPDATE", "update", 2..2, Keyed;
    Delete = 54, "DELETE", "delete", 1..1, Keyed;
    Replace = 55, "REPLACE", "replace", 2..2, Keyed;

    // arithmetic and logic
    Add = 24, "ADD", "add", 2..2, Fixed;
    Sub = 25, "SUB", "sub", 2..2, Fixed;
    Mul = 26, "MUL", "mul", 2..2, Fixed;
    Div = 27, "DIV", "div", 2..2, Fixed;
    Mod = 28, "MOD", "mod", 2..2, Fixed;
    Floor = 183, "FLOOR", "floor", 1..1, Fixed;
    Ceil = 184, "CEIL", "ceil", 1..1, Fixed;
    Round = 185, "ROUND", "round", 1..1, Fixed;
    Eq = 17, "EQ", "eq", 2..*, Variadic;
    Ne = 18, "NE", "ne", 2..*, Variadic;
    Lt = 19, "LT", "lt", 2..*, Variadic;
    Le = 20, "LE", "le", 2..*, Variadic;
    Gt = 21, "GT", "gt", 2..*, Variadic;
    Ge = 22, "GE", "ge", 2..*, Variadic;
    Not = 23, "NOT", "not", 1..1, Fixed;
    And = 67, "AND", "and", 0..*, Variadic;
    Or = 66, "OR", "or", 0..*, Variadic;
    Random = 151, "RANDOM", "random", 0..2, Constructor;
    MinVal = 180, "MINVAL", "minval", 0..0, Nullary;
    MaxVal = 181, "MAXVAL", "maxval", 0..0, Nullary;

    // time
    Now = 103, "NOW", "now", 0..0, Nullary;
    Time = 136, "TIME", "time", 3..7, Constructor;
    EpochTime = 101, "EPOCH_TIME", "epochTime", 1..1, Constructor;
    Iso8601 = 99, "ISO8601", "ISO8601", 1..1, Constructor;
    InTimezone = 104, "IN_TIMEZONE", "inTimezone", 2..2, Fixed;
    Timezone = 127, "TIMEZONE", "timezone", 1..1, Fixed;
    During = 105, "DURING", "during", 3..3, Keyed;
    Date = 106, "DATE", "date", 1..1, Fixed;
    TimeOfDay = 126, "TIME_OF_DAY", "timeOfDay", 1..1, Fixed;
    Year = 128, "YEAR", "year", 1..1, Fixed;
    Month = 129, "MONTH", "month", 1..1, Fixed;
    Day = 130, "DAY", "day", 1..1, Fixed;
    DayOfWeek = 131, "DAY_OF_WEEK", "dayOfWeek", 1..1, Fixed;
    DayOfYear = 132, "DAY_OF_YEAR", "dayOfYear", 1..1, Fixed;
    Hours = 133, "HOURS", "hours", 1..1, Fixed;
    Minutes = 134, "MINUTES", "minutes", 1..1, Fixed;
    Seconds = 135, "SECONDS", "seconds", 1..1, Fixed;
    ToIso8601 = 100, "TO_ISO8601", "toISO8601", 1..1, Fixed;
    ToEpochTime = 102, "TO_EPOCH_TIME", "toEpochTime", 1..1, Fixed;
    Monday = 107, "MONDAY", "monday", 0..0, Nullary;
    Tuesday = 108, "TUESDAY", "tuesday", 0..0, Nullary;
    Wednesday = 109, "WEDNESDAY", "wednesday", 0..0, Nullary;
    Thursday = 110, "THURSDAY", "thursday", 0..0, Nullary;
    Friday = 111, "FRIDAY", "friday", 0..0, Nullary;
    Saturday = 112, "SATURDAY", "saturday", 0..0, Nullary;
    Sunday = 113, "SUNDAY", "sunday", 0..0, Nullary;
    January = 114, "JANUARY", "january", 0..0, Nullary;
    February = 115, "FEBRUARY", "february", 0..0, Nullary;
    March = 116, "MARCH", "march", 0..0, Nullary;
    April = 117, "APRIL", "april", 0..0, Nullary;
    May = 118, "MAY", "may", 0..0, Nullary;
    June = 119, "JUNE", "june", 0..0, Nullary;
    July = 120, "JULY", "july", 0..0, Nullary;
    August = 121, "AUGUST", "august", 0..0, Nullary;
    September = 122, "SEPTEMBER", "september", 0..0, Nullary;
    October = 123, "OCTOBER", "october", 0..0, Nullary;
    November = 124, "NOVEMBER", "november", 0..0, Nullary;
    December = 125, "DECEMBER", "december", 0..0, Nullary;

    // strings
    Match = 97, "MATCH", "match", 2..2, Fixed;
    Split = 149, "SPLIT", "split", 1..3, Fixed;
    Upcase = 141, "UPCASE", "upcase", 1..1, Fixed;
    Downcase = 142, "DOWNCASE", "downcase", 1..1, Fixed;

    // control flow and types
    Branch = 65, "BRANCH", "branch", 3..*, Constructor;
    Error = 12, "ERROR", "error", 0..1, Constructor;
    Default = 92, "DEFAULT", "default", 2..2, Fixed;
    Range = 173, "RANGE", "range", 0..2, Constructor;
    Args = 154, "ARGS", "args", 1..1, Constructor;
    CoerceTo = 51, "COERCE_TO", "coerceTo", 2..2, Fixed;
    TypeOf = 52, "TYPE_OF", "typeOf", 1..1, Fixed;
    Json = 98, "JSON", "json", 1..1, Constructor;
    ToJsonString = 172, "TO_JSON_STRING", "toJsonString", 1..1, Fixed;
    Http = 153, "HTTP", "http", 1..1, Constructor;
    Uuid = 169, "UUID", "uuid", 0..1, Constructor;

    // never dispatched
    Javascript = 11, "JAVASCRIPT", "js", 1..1, Forbidden;
    InnerJoin = 48, "INNER_JOIN", "innerJoin", 3..3, Forbidden;
    OuterJoin = 49, "OUTER_JOIN", "outerJoin", 3..3, Forbidden;
    EqJoin = 50, "EQ_JOIN", "eqJoin", 3..3, Forbidden;
    Zip = 72, "ZIP", "zip", 1..1, Forbidden;
    DbCreate = 57, "DB_CREATE", "dbCreate", 1..1, Forbidden;
    DbDrop = 58, "DB_DROP", "dbDrop", 1..1, Forbidden;
    DbList = 59, "DB_LIST", "dbList", 0..0, Forbidden;
    TableCreate = 60, "TABLE_CREATE", "tableCreate", 1..2, Forbidden;
    TableDrop = 61, "TABLE_DROP", "tableDrop", 1..2, Forbidden;
    TableList = 62, "TABLE_LIST", "tableList", 0..1, Forbidden;
    IndexCreate = 75, "INDEX_CREATE", "indexCreate", 2..3, Forbidden;
    IndexDrop = 76, "INDEX_DROP", "indexDrop", 2..2, Forbidden;
    IndexList = 77, "INDEX_LIST", "indexList", 1..1, Forbidden;
    IndexStatus = 139, "INDEX_STATUS", "indexStatus", 1..*, Forbidden;
    IndexWait = 140, "INDEX_WAIT", "indexWait", 1..*, Forbidden;
    IndexRename = 156, "INDEX_RENAME", "indexRename", 3..3, Forbidden;
    Sync = 138, "SYNC", "sync", 1..1, Forbidden;
    Config = 174, "CONFIG", "config", 1..1, Forbidden;
    Status = 175, "STATUS", "status", 1..1, Forbidden;
    Reconfigure = 176, "RECONFIGURE", "reconfigure", 1..1, Forbidden;
    Wait = 177, "WAIT", "wait", 1..1, Forbidden;
    Rebalance = 179, "REBALANCE", "rebalance", 1..1, Forbidden;
    Grant = 188, "GRANT", "grant", 2..3, Forbidden;
    Changes = 152, "CHANGES", "changes", 1..1, Forbidden;
}

impl TermType {
    pub fn code(self) -> u64 {
        self as u64
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn is_forbidden(self) -> bool {
        self.descriptor().consumption == Consumption::Forbidden
    }

    /// Codes whose `args` element is a single payload that must never be
    /// decomposed into operator children.
    pub fn has_opaque_payload(self) -> bool {
        OPAQUE_PAYLOAD.contains(&self)
    }
}

/// The closed set of opaque-payload codes, shared by `classify` and `tree::parse`.
pub const OPAQUE_PAYLOAD: [TermType; 2] = [TermType::MakeArray, TermType::Var];

impl fmt::Display for TermType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn lookup(code: u64) -> Option<OperationDescriptor> {
    TermType::from_code(code).map(TermType::descriptor)
}

/// Protocol name of a code, `None` when the code is not in the catalog.
pub fn translate(code: u64) -> Option<&'static str> {
    lookup(code).map(|descriptor| descriptor.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_term() {
        assert_eq!(translate(1), Some("DATUM"));
        assert_eq!(translate(14), Some("DB"));
        assert_eq!(translate(15), Some("TABLE"));
        assert_eq!(translate(39), Some("FILTER"));
        assert_eq!(translate(999), None);
    }

    #[test]
    fn codes_round_trip_through_lookup() {
        for term_type in TermType::ALL {
            assert_eq!(TermType::from_code(term_type.code()), Some(*term_type));
        }
    }

    #[test]
    fn forbidden_subset() {
        assert!(TermType::InnerJoin.is_forbidden());
        assert!(TermType::DbCreate.is_forbidden());
        assert!(!TermType::Filter.is_forbidden());
    }

    #[test]
    fn arity_bounds() {
        let add = TermType::Add.descriptor();
        assert!(add.accepts(2));
        assert!(!add.accepts(3));

        let pluck = TermType::Pluck.descriptor();
        assert!(pluck.accepts(1));
        assert!(pluck.accepts(12));
        assert!(!pluck.accepts(0));
    }
}
