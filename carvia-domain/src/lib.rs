pub mod booking;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod pricing;
pub mod repository;

pub use booking::{
    AvailabilityRequest, Booking, BookingStatus, BookingWithCar, CarSummary,
    CreateBookingRequest, NewBooking,
};
pub use error::LedgerError;
pub use ledger::BookingLedger;
pub use repository::{
    ActiveCar, BookingEvent, BookingEventKind, BookingNotifier, BookingStore, CarLookup,
};
