//! Shared constants: retained columns, outlier columns and the random seed

/// Accented characters folded to plain ASCII in district slugs
pub const CHARACTER_FOLD: [(char, char); 12] = [
    ('á', 'a'),
    ('é', 'e'),
    ('í', 'i'),
    ('ó', 'o'),
    ('ú', 'u'),
    ('Á', 'A'),
    ('É', 'E'),
    ('Í', 'I'),
    ('Ó', 'O'),
    ('Ú', 'U'),
    ('ñ', 'n'),
    ('Ñ', 'N'),
];

/// Columns retained in the cleaned output table
pub const OUT_COLS: [&str; 24] = [
    "ID",
    "admitsPets",
    "bathrooms",
    "district_clean",
    "exterior",
    "hasAircon",
    "hasCupboards",
    "hasGarden",
    "hasLift",
    "hasPool",
    "hasStorage",
    "hasTerrace",
    "price",
    "size_const",
    "status_clean",
    "energy_clean",
    "floor_clean",
    "furniture_clean",
    "garage_clean",
    "rooms_clean",
    "north",
    "east",
    "west",
    "south",
];

/// Numeric columns checked by the interquartile-range outlier filter
pub const OUTLIER_COLS: [&str; 4] = ["bathrooms", "price", "rooms_clean", "size_const"];

/// Columns carried along but never fed to a model
pub const EXCLUDED_COLS: [&str; 1] = ["ID"];

/// Seed for every source of randomness, so runs are reproducible
pub const RANDOM_STATE: u64 = 34093458;
