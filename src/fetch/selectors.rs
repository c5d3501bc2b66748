//! CSS selectors for the porter.in estimate flow.
//!
//! The site ships hashed CSS-module class names, so these break whenever it
//! redeploys. Where a fallback exists it is listed after the primary selector.

pub const SITE_URL: &str = "https://porter.in/";

pub const CITY_SELECTOR: &str = ".CitySelector_city-selected-text__1dNz4";
pub const CITY_OPTIONS: &str = r#"[class^="CitySelectorModal_city-title"]"#;

pub const ESTIMATE_CARD: &str = ".EstimateCard_estimate-card__NgFIr";

pub const SERVICE_CONTAINERS: &[&str] = &[
    ".CategorySelector_category-select-container__LgXjx",
    "[class*='CategorySelector'][class*='container']",
    "[class*='category-select-container']",
    "[class*='category'][class*='container']",
];

pub const REQUIREMENT_INPUTS: &[&str] = &[
    r#"input[value="personal"]"#,
    "[class*='requirement-input']",
    r#"input[name="requirement"]"#,
];

/// Selects the personal requirement radio when clicking fails.
pub const REQUIREMENT_SCRIPT: &str = r#"(() => {
    for (const radio of document.querySelectorAll('input[name="requirement"]')) {
        if (radio.value === 'personal') {
            radio.checked = true;
            radio.dispatchEvent(new Event('change', { bubbles: true }));
            return true;
        }
    }
    return false;
})()"#;

/// Empties an input before typing into it.
pub const CLEAR_INPUT_FN: &str = "function() { this.value = ''; }";

pub const PICKUP_INPUT: &str = r#"input[placeholder="Enter pickup address"]"#;
pub const DROP_INPUT: &str = r#"input[placeholder="Enter drop address"]"#;

pub const AUTOCOMPLETE_OPTIONS: &[&str] = &[
    ".pac-item",
    "[role='option']",
    "[class*='autocomplete'] li",
    "[class*='suggestion'] li",
    "[class*='dropdown'] li",
];

pub const MOBILE_INPUT: &str = ".FareEstimateForms_mobile-input__jy5wR";
pub const NAME_INPUT: &str = ".FareEstimateForms_name-input__n8xyD";
pub const SUBMIT_BUTTON: &str =
    ".FormInput_submit__ea0jJ.FormInput_submit-enabled__DbSnE.FareEstimateForms_submit-container___lB5u";

pub const RESULT_CARD: &str = ".FareEstimateResultVehicleCard_container__BdMav";
pub const CARD_VEHICLE_NAME: &str = ".FareEstimateResultVehicleCard_vehicle-name__d4107";
pub const CARD_FARE: &str = ".FareEstimateResultVehicleCard_vehicle-fare__3YMOc p";
pub const CARD_CAPACITY: &str = ".VehicleCapacity_vehicle-capacity__P53Z0";
