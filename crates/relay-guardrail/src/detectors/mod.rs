pub mod address;
pub mod api_key;
pub mod aws_key;
pub mod credit_card;
pub mod dictionaries;
pub mod email;
pub mod entropy;
pub mod iban;
pub mod ip;
pub mod jwt;
pub mod name;
pub mod passport;
pub mod password;
pub mod phone;
pub mod private_key;
pub mod ssn;
pub mod url_cred;
