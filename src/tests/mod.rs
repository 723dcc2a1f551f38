mod helpers;
mod roundtrip;
