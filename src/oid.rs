//! Distinguished-name attribute OIDs.
//!
//! Issuer/subject entries are keyed by the dotted-decimal OID of the
//! attribute type, independent of the provider's internal numbering.

use openssl::nid::Nid;

pub const COMMON_NAME: &str = "2.5.4.3";
pub const SURNAME: &str = "2.5.4.4";
pub const SERIAL_NUMBER: &str = "2.5.4.5";
pub const COUNTRY_NAME: &str = "2.5.4.6";
pub const LOCALITY_NAME: &str = "2.5.4.7";
pub const STATE_OR_PROVINCE_NAME: &str = "2.5.4.8";
pub const STREET_ADDRESS: &str = "2.5.4.9";
pub const ORGANIZATION_NAME: &str = "2.5.4.10";
pub const ORGANIZATIONAL_UNIT_NAME: &str = "2.5.4.11";
pub const TITLE: &str = "2.5.4.12";
pub const GIVEN_NAME: &str = "2.5.4.42";
pub const EMAIL_ADDRESS: &str = "1.2.840.113549.1.9.1";
pub const DOMAIN_COMPONENT: &str = "0.9.2342.19200300.100.1.25";

/// Dotted-decimal OID for the provider's attribute id, when it is one of
/// the attribute types this crate names.
pub(crate) fn from_nid(nid: Nid) -> Option<&'static str> {
    match nid {
        Nid::COMMONNAME => Some(COMMON_NAME),
        Nid::SURNAME => Some(SURNAME),
        Nid::SERIALNUMBER => Some(SERIAL_NUMBER),
        Nid::COUNTRYNAME => Some(COUNTRY_NAME),
        Nid::LOCALITYNAME => Some(LOCALITY_NAME),
        Nid::STATEORPROVINCENAME => Some(STATE_OR_PROVINCE_NAME),
        Nid::STREETADDRESS => Some(STREET_ADDRESS),
        Nid::ORGANIZATIONNAME => Some(ORGANIZATION_NAME),
        Nid::ORGANIZATIONALUNITNAME => Some(ORGANIZATIONAL_UNIT_NAME),
        Nid::TITLE => Some(TITLE),
        Nid::GIVENNAME => Some(GIVEN_NAME),
        Nid::PKCS9_EMAILADDRESS => Some(EMAIL_ADDRESS),
        Nid::DOMAINCOMPONENT => Some(DOMAIN_COMPONENT),
        _ => None,
    }
}
