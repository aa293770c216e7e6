pub const GFS_FILTER_URL: &str = "https://nomads.ncep.noaa.gov/cgi-bin/filter_gfs_1p00.pl";
pub const GFS_FILE_SUFFIX: &str = "z.pgrb2.1p00.f000";
pub const GFS_LEVELS: [&str; 2] = ["lev_10_m_above_ground", "lev_surface"];
pub const GFS_VARIABLES: [&str; 3] = ["var_TMP", "var_UGRD", "var_VGRD"];
pub const GFS_LEFT_LON: i32 = 0;
pub const GFS_RIGHT_LON: i32 = 360;
pub const GFS_TOP_LAT: i32 = 90;
pub const GFS_BOTTOM_LAT: i32 = -90;

pub const GRID_INTERVAL_HOURS: u32 = 6;

pub const RAW_DIR_NAME: &str = "grib-data";
pub const JSON_DIR_NAME: &str = "json-data";
pub const RAW_EXTENSION: &str = "f000";
pub const JSON_EXTENSION: &str = "json";
pub const STAGING_EXTENSION: &str = "part";

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:9292";
pub const DEFAULT_STORAGE_DIR: &str = "./wind-data";
pub const DEFAULT_CONVERTER_BIN: &str = "converter/bin/grib2json";
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 120;
pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 900;
pub const DEFAULT_HARVEST_HORIZON_DAYS: u64 = 30;

pub const SERVICE_NAME: &str = "WindJS GRIB2 server";
pub const USER_AGENT: &str = "wind-harvest/1.0";
pub const STAMP_HEADER: &str = "X-WIND-STAMP";
