//! Canonical import schemas and their alias vocabularies.
//!
//! Field order is the order fields appear in the mapped output. Alias order
//! matters: on exact matches the earliest alias wins.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Target entity kind of an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImportSource {
    Drivers,
    Patients,
    Employees,
    Trips,
}

impl ImportSource {
    pub const ALL: [ImportSource; 4] = [
        ImportSource::Drivers,
        ImportSource::Patients,
        ImportSource::Employees,
        ImportSource::Trips,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drivers => "drivers",
            Self::Patients => "patients",
            Self::Employees => "employees",
            Self::Trips => "trips",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drivers" | "driver" => Some(Self::Drivers),
            "patients" | "patient" => Some(Self::Patients),
            "employees" | "employee" => Some(Self::Employees),
            "trips" | "trip" => Some(Self::Trips),
            _ => None,
        }
    }

    /// Singular name stored as `record_type` on staging records.
    pub fn record_type(&self) -> &'static str {
        match self {
            Self::Drivers => "driver",
            Self::Patients => "patient",
            Self::Employees => "employee",
            Self::Trips => "trip",
        }
    }

    pub fn schema(&self) -> &'static CanonicalSchema {
        match self {
            Self::Drivers => &DRIVERS,
            Self::Patients => &PATIENTS,
            Self::Employees => &EMPLOYEES,
            Self::Trips => &TRIPS,
        }
    }
}

impl std::fmt::Display for ImportSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One canonical field and the header texts recognized for it.
#[derive(Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    /// Core fields land in the top-level mapped record, others in the metadata bag.
    pub core: bool,
}

/// Ordered field table for one import source.
#[derive(Debug)]
pub struct CanonicalSchema {
    pub source: ImportSource,
    /// Field that must resolve for a row to be staged as `pending`.
    pub identity_field: &'static str,
    /// Field treated as a date regardless of its name.
    pub birth_date_field: Option<&'static str>,
    pub fields: &'static [FieldSpec],
}

impl CanonicalSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Date coercion applies to fields named `*date*` and to the birth-date field.
    pub fn is_date_field(&self, name: &str) -> bool {
        name.contains("date") || self.birth_date_field == Some(name)
    }
}

const fn core(name: &'static str, aliases: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        name,
        aliases,
        core: true,
    }
}

const fn extra(name: &'static str, aliases: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        name,
        aliases,
        core: false,
    }
}

const EMAIL_ALIASES: &[&str] = &["email", "email_address", "e_mail", "mail"];
const PHONE_ALIASES: &[&str] = &[
    "phone",
    "phone_number",
    "mobile",
    "cell",
    "telephone",
    "contact_number",
];
const DOB_ALIASES: &[&str] = &["dob", "date_of_birth", "birth_date", "birthdate", "birthday"];
const ADDRESS_ALIASES: &[&str] = &["address", "street_address", "home_address", "street"];
const NOTES_ALIASES: &[&str] = &["notes", "comments", "remarks"];

pub static DRIVERS: CanonicalSchema = CanonicalSchema {
    source: ImportSource::Drivers,
    identity_field: "full_name",
    birth_date_field: Some("dob"),
    fields: &[
        core("full_name", &["full_name", "name", "driver_name", "driver"]),
        core("email", EMAIL_ALIASES),
        core("phone", PHONE_ALIASES),
        extra("first_name", &["first_name", "fname", "given_name"]),
        extra("last_name", &["last_name", "lname", "surname"]),
        extra(
            "license_number",
            &["license_number", "license_no", "dl_number", "license", "drivers_license"],
        ),
        extra(
            "license_expiry_date",
            &["license_expiry_date", "license_expiration", "license_exp", "expiration_date"],
        ),
        extra("vehicle", &["vehicle", "vehicle_type", "unit"]),
        extra("hire_date", &["hire_date", "date_hired", "start_date"]),
        extra("dob", DOB_ALIASES),
        extra("address", ADDRESS_ALIASES),
        extra("status", &["status", "driver_status"]),
        extra("notes", NOTES_ALIASES),
    ],
};

pub static PATIENTS: CanonicalSchema = CanonicalSchema {
    source: ImportSource::Patients,
    identity_field: "full_name",
    birth_date_field: Some("dob"),
    fields: &[
        core(
            "full_name",
            &["full_name", "patient_name", "name", "patient", "client_name", "member_name"],
        ),
        core("email", EMAIL_ALIASES),
        core("phone", PHONE_ALIASES),
        core("dob", DOB_ALIASES),
        extra("address", ADDRESS_ALIASES),
        extra("city", &["city", "town"]),
        extra("state", &["state", "province"]),
        extra("zip", &["zip", "zip_code", "zipcode", "postal_code"]),
        extra(
            "medicaid_id",
            &["medicaid_id", "medicaid", "member_id", "insurance_id", "policy_number"],
        ),
        extra(
            "insurance_provider",
            &["insurance_provider", "insurance", "payer", "plan"],
        ),
        extra(
            "mobility",
            &["mobility", "mobility_type", "level_of_service", "wheelchair"],
        ),
        extra("gender", &["gender", "sex"]),
        extra(
            "emergency_contact",
            &["emergency_contact", "emergency_name", "emergency"],
        ),
        extra("notes", NOTES_ALIASES),
    ],
};

pub static EMPLOYEES: CanonicalSchema = CanonicalSchema {
    source: ImportSource::Employees,
    identity_field: "full_name",
    birth_date_field: Some("dob"),
    fields: &[
        core(
            "full_name",
            &["full_name", "employee_name", "name", "staff_name", "employee"],
        ),
        core("email", EMAIL_ALIASES),
        core("phone", PHONE_ALIASES),
        extra(
            "employee_id",
            &["employee_id", "employee_number", "emp_id", "badge"],
        ),
        extra("position", &["position", "job_title", "title", "role"]),
        extra("department", &["department", "dept", "division", "team"]),
        extra("hire_date", &["hire_date", "date_hired", "start_date"]),
        extra("pay_rate", &["pay_rate", "hourly_rate", "rate", "wage", "salary"]),
        extra("dob", DOB_ALIASES),
        extra("address", ADDRESS_ALIASES),
        extra("status", &["status", "employment_status"]),
        extra("notes", NOTES_ALIASES),
    ],
};

pub static TRIPS: CanonicalSchema = CanonicalSchema {
    source: ImportSource::Trips,
    identity_field: "patient_name",
    birth_date_field: None,
    fields: &[
        core(
            "patient_name",
            &["patient_name", "patient", "client", "rider", "member_name", "name"],
        ),
        core(
            "trip_date",
            &["trip_date", "date_of_service", "service_date", "dos", "date"],
        ),
        core(
            "pickup_address",
            &["pickup_address", "pickup", "pu_address", "origin", "from"],
        ),
        core(
            "dropoff_address",
            &["dropoff_address", "dropoff", "destination", "do_address", "to"],
        ),
        extra(
            "pickup_time",
            &["pickup_time", "pu_time", "appointment_time", "appt_time", "time"],
        ),
        extra("driver_name", &["driver_name", "driver"]),
        extra("vehicle", &["vehicle", "vehicle_type", "unit"]),
        extra("miles", &["miles", "mileage", "distance", "trip_miles"]),
        extra("fare", &["fare", "cost", "amount", "price", "charge"]),
        extra("trip_id", &["trip_id", "trip_number", "confirmation", "booking_id"]),
        extra("status", &["status", "trip_status"]),
        extra("notes", NOTES_ALIASES),
    ],
};
