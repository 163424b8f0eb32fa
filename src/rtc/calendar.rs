//! Calendar clock advanced once per elapsed second

/// Year stored as an offset from this epoch
pub const EPOCH_YEAR: u16 = 2000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Weekday {
    Monday = 0,
    Tuesday = 1,
    Wednesday = 2,
    Thursday = 3,
    Friday = 4,
    Saturday = 5,
    Sunday = 6,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() as usize + 1) % 7]
    }

    pub fn previous(self) -> Self {
        Self::ALL[(self.index() as usize + 6) % 7]
    }
}

/// Gregorian leap year test on the stored year offset
pub fn is_leap_year(year: u8) -> bool {
    let year = EPOCH_YEAR + year as u16;
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

pub fn days_in_month(year: u8, month: u8) -> u8 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Day of week for a valid date (Sakamoto's method)
pub fn weekday(year: u8, month: u8, day: u8) -> Weekday {
    const OFFSETS: [u16; 12] = [0, 3, 2, 5, 0, 3, 5, 1, 4, 6, 2, 4];
    let mut y = EPOCH_YEAR + year as u16;
    if month < 3 {
        y -= 1;
    }
    let sunday_based = (y + y / 4 - y / 100 + y / 400 + OFFSETS[(month - 1) as usize] + day as u16) % 7;
    Weekday::ALL[((sunday_based + 6) % 7) as usize]
}

/// Highest field changed by one [`Calendar::tick`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rollover {
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Calendar {
    year: u8,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    day_of_week: Weekday,
}

impl Calendar {
    pub const RAW_SIZE: usize = 7;

    /// Validated constructor; the weekday is derived from the date.
    pub fn new(year: u8, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Option<Self> {
        if !(1..=12).contains(&month)
            || day == 0
            || day > days_in_month(year, month)
            || hour > 23
            || minute > 59
            || second > 59
        {
            return None;
        }
        Some(Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            day_of_week: weekday(year, month, day),
        })
    }

    #[inline]
    pub fn year(&self) -> u8 {
        self.year
    }

    #[inline]
    pub fn month(&self) -> u8 {
        self.month
    }

    #[inline]
    pub fn day(&self) -> u8 {
        self.day
    }

    #[inline]
    pub fn hour(&self) -> u8 {
        self.hour
    }

    #[inline]
    pub fn minute(&self) -> u8 {
        self.minute
    }

    #[inline]
    pub fn second(&self) -> u8 {
        self.second
    }

    #[inline]
    pub fn day_of_week(&self) -> Weekday {
        self.day_of_week
    }

    pub fn minutes_of_day(&self) -> u16 {
        self.hour as u16 * 60 + self.minute as u16
    }

    #[inline]
    pub fn is_minute_start(&self) -> bool {
        self.second == 0
    }

    /// Saturday 10:00:00, when the valve is exercised once a week
    pub fn is_valve_protection_time(&self) -> bool {
        self.day_of_week == Weekday::Saturday
            && self.hour == 10
            && self.minute == 0
            && self.second == 0
    }

    /// Advance by exactly one second. Must run once per elapsed second.
    pub fn tick(&mut self) -> Rollover {
        self.second += 1;
        if self.second < 60 {
            return Rollover::Second;
        }
        self.second = 0;

        self.minute += 1;
        if self.minute < 60 {
            return Rollover::Minute;
        }
        self.minute = 0;

        self.hour += 1;
        if self.hour < 24 {
            return Rollover::Hour;
        }
        self.hour = 0;

        self.advance_day()
    }

    fn advance_day(&mut self) -> Rollover {
        self.day_of_week = self.day_of_week.next();

        self.day += 1;
        if self.day <= days_in_month(self.year, self.month) {
            return Rollover::Day;
        }
        self.day = 1;

        self.month += 1;
        if self.month <= 12 {
            return Rollover::Month;
        }
        self.month = 1;

        self.year = self.year.wrapping_add(1);
        if self.year == 0 {
            // Past the representable range: the weekday chain no longer holds
            self.recompute_weekday();
        }
        Rollover::Year
    }

    fn recompute_weekday(&mut self) {
        self.day_of_week = weekday(self.year, self.month, self.day);
    }

    /// Setters take wheel-style values and wrap them into range.
    pub fn set_second(&mut self, second: i8) {
        self.second = (second as i16).rem_euclid(60) as u8;
    }

    pub fn set_minute(&mut self, minute: i8) {
        self.minute = (minute as i16).rem_euclid(60) as u8;
    }

    pub fn set_hour(&mut self, hour: i8) {
        self.hour = (hour as i16).rem_euclid(24) as u8;
    }

    /// Day wraps within the current month
    pub fn set_day(&mut self, day: i8) {
        let len = days_in_month(self.year, self.month) as i16;
        self.day = ((day as i16 - 1).rem_euclid(len) + 1) as u8;
        self.recompute_weekday();
    }

    pub fn set_month(&mut self, month: i8) {
        self.month = ((month as i16 - 1).rem_euclid(12) + 1) as u8;
        self.clamp_day();
        self.recompute_weekday();
    }

    pub fn set_year(&mut self, year: u8) {
        self.year = year;
        self.clamp_day();
        self.recompute_weekday();
    }

    pub fn set_date(&mut self, year: u8, month: i8, day: i8) {
        self.set_year(year);
        self.set_month(month);
        self.set_day(day);
    }

    fn clamp_day(&mut self) {
        let len = days_in_month(self.year, self.month);
        if self.day > len {
            self.day = len;
        }
    }

    pub fn to_raw(&self) -> [u8; Self::RAW_SIZE] {
        [
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.day_of_week.index(),
        ]
    }

    /// Decode the persisted form. The stored weekday is ignored and derived
    /// again from the date.
    pub fn from_raw(raw: [u8; Self::RAW_SIZE]) -> Option<Self> {
        Self::new(raw[0], raw[1], raw[2], raw[3], raw[4], raw[5])
    }
}

impl Default for Calendar {
    /// 2000-01-01 00:00:00, a Saturday
    fn default() -> Self {
        Self {
            year: 0,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
            day_of_week: Weekday::Saturday,
        }
    }
}
